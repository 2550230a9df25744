use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use reqwest::{header::HeaderMap, Client};
use tokio_util::sync::CancellationToken;

use crate::{
    cache::SegmentCache,
    download::{ParallelDownloaderBuilder, Progress, ProgressCallback, DEFAULT_CONCURRENCY},
    error::RangedlResult,
    fetch::{SegmentFetcher, DEFAULT_SEGMENT_TIMEOUT},
    manifest::{segment_base_url, Manifest, TrackKind},
    merge::Muxer,
    track::process_track,
    util::{
        http::{build_client, DEFAULT_USER_AGENT},
        path::remove_file_if_exists,
    },
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Segments fetched at the same time per track.
    pub concurrency: NonZeroU32,
    /// Timeout of a single segment request.
    pub segment_timeout: Duration,
    pub user_agent: String,
    /// Headers sent with the playlist and every segment request.
    pub headers: HeaderMap,
    /// Parent of the per-run directory holding intermediate files, the system
    /// temp directory if unset.
    pub temp_dir: Option<PathBuf>,
    /// Keep the temp directory and merged tracks after muxing.
    pub keep_temp: bool,
    /// Path of the ffmpeg executable, looked up in `PATH` if unset.
    pub ffmpeg: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            segment_timeout: DEFAULT_SEGMENT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: HeaderMap::new(),
            temp_dir: None,
            keep_temp: false,
            ffmpeg: None,
        }
    }
}

impl SessionConfig {
    pub fn client(&self) -> RangedlResult<Client> {
        build_client(&self.user_agent, self.headers.clone())
    }

    /// Fresh working directory for one run, created below `temp_dir` or the
    /// system temp directory.
    pub fn resolve_temp_dir(&self) -> PathBuf {
        let parent = self.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        parent.join(format!("rangedl_{started_at}_{}", rand::random::<u8>()))
    }
}

/// Runs the video and audio track pipelines of one playlist and muxes the results.
pub struct Session<F, M> {
    fetcher: Arc<F>,
    muxer: M,
    cache: SegmentCache,

    concurrency: NonZeroU32,
    keep_temp: bool,
    cancel: Option<CancellationToken>,
    on_progress: Option<ProgressCallback>,
}

impl<F, M> Session<F, M>
where
    F: SegmentFetcher,
    M: Muxer,
{
    pub fn new(fetcher: F, muxer: M, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            muxer,
            cache: SegmentCache::new(temp_dir),
            concurrency: DEFAULT_CONCURRENCY,
            keep_temp: false,
            cancel: None,
            on_progress: None,
        }
    }

    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn keep_temp(mut self, keep_temp: bool) -> Self {
        self.keep_temp = keep_temp;
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn on_progress<C>(mut self, callback: C) -> Self
    where
        C: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Download both tracks of `manifest` and mux them into `output`.
    ///
    /// Both tracks are attempted even if the first one fails, but the muxer is
    /// only invoked when both succeeded. Intermediate files are removed in
    /// every case unless `keep_temp` is set.
    pub async fn run(
        &self,
        manifest: &Manifest,
        playlist_url: &str,
        output: &Path,
    ) -> RangedlResult<PathBuf> {
        self.cache.ensure_cache_dir().await?;
        let base_url = segment_base_url(playlist_url);

        let mut downloader = ParallelDownloaderBuilder::new()
            .concurrency(self.concurrency)
            .progress_callback(self.on_progress.clone());
        if let Some(cancel) = &self.cancel {
            downloader = downloader.cancel_token(cancel.clone());
        }
        let downloader = downloader.build(self.fetcher.clone());

        let video = process_track(
            manifest,
            TrackKind::Video,
            &base_url,
            &self.cache,
            &downloader,
        )
        .await;
        if let Err(e) = &video {
            tracing::error!("Video track failed: {e}");
        }
        let audio = process_track(
            manifest,
            TrackKind::Audio,
            &base_url,
            &self.cache,
            &downloader,
        )
        .await;
        if let Err(e) = &audio {
            tracing::error!("Audio track failed: {e}");
        }

        let result = match (video, audio) {
            (Ok(video), Ok(audio)) => {
                let muxed = self.muxer.mux(&video, &audio, output).await;
                self.remove_tracks(&[video, audio]).await;
                muxed
            }
            (Err(e), Ok(track)) | (Ok(track), Err(e)) => {
                tracing::warn!("Skipping mux because a track is incomplete.");
                self.remove_tracks(&[track]).await;
                Err(e)
            }
            (Err(e), Err(_)) => {
                tracing::warn!("Skipping mux because a track is incomplete.");
                Err(e)
            }
        };

        self.cleanup().await;
        result?;

        tracing::info!(
            "All finished. Please checkout your files at {}",
            output.display()
        );
        Ok(output.to_path_buf())
    }

    async fn remove_tracks(&self, tracks: &[PathBuf]) {
        if self.keep_temp {
            return;
        }
        for track in tracks {
            if let Err(e) = remove_file_if_exists(track).await {
                tracing::warn!("Cleanup warning: {}: {e}", track.display());
            }
        }
    }

    async fn cleanup(&self) {
        if self.keep_temp {
            tracing::info!(
                "Keeping temporary files at {}",
                self.cache.location_hint()
            );
            return;
        }
        if let Err(e) = self.cache.clear().await {
            tracing::warn!("Cleanup warning: {e}");
        }
    }
}
