use std::{future::Future, path::Path, time::Duration};

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{
    error::{RangedlError, RangedlResult},
    util::path::{remove_file_if_exists, RangedlPathExt},
};

pub const DEFAULT_SEGMENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of a single segment fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub ok: bool,
    /// Bytes persisted to the slot, `0` on failure.
    pub bytes: u64,
}

impl FetchResult {
    pub fn success(bytes: u64) -> Self {
        Self { ok: true, bytes }
    }

    pub fn failed() -> Self {
        Self { ok: false, bytes: 0 }
    }
}

pub trait SegmentFetcher: Send + Sync + 'static {
    /// Fetch `url` and store its body at `slot`.
    ///
    /// Failures are reported through [FetchResult] instead of an error, and
    /// must not leave a file at `slot`.
    fn fetch(&self, url: &str, slot: &Path) -> impl Future<Output = FetchResult> + Send;
}

pub struct HttpSegmentFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpSegmentFetcher {
    /// The client is expected to carry the headers to forward, see [crate::util::http::build_client].
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_SEGMENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_to_file(&self, url: &str, part: &Path, slot: &Path) -> RangedlResult<u64> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        if response.status() != StatusCode::OK {
            return Err(RangedlError::HttpError(response.status()));
        }

        let mut file = File::create(part).await?;
        let mut written = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(part, slot).await?;
        Ok(written)
    }
}

impl SegmentFetcher for HttpSegmentFetcher {
    async fn fetch(&self, url: &str, slot: &Path) -> FetchResult {
        let part = slot.part_path();
        match self.fetch_to_file(url, &part, slot).await {
            Ok(bytes) => FetchResult::success(bytes),
            Err(e) => {
                tracing::warn!("Fetching {url} failed. {e}");
                if let Err(e) = remove_file_if_exists(&part).await {
                    tracing::warn!("Failed to remove {}: {e}", part.display());
                }
                FetchResult::failed()
            }
        }
    }
}
