use std::{
    collections::VecDeque,
    num::NonZeroU32,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{sync::Mutex, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{RangedlError, RangedlResult},
    fetch::{FetchResult, SegmentFetcher},
};

pub const DEFAULT_CONCURRENCY: NonZeroU32 = match NonZeroU32::new(24) {
    Some(concurrency) => concurrency,
    None => unreachable!(),
};

/// One segment to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentJob {
    /// Position of the segment in its variant, which is also its merge order.
    pub index: usize,
    pub url: String,
    pub slot: PathBuf,
}

/// Snapshot of a running download, emitted after every finished segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub succeeded: usize,
    pub completed: usize,
    pub total: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Progress {
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / 1024. / 1024.
    }

    /// Average speed in MB/s.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed > 0. {
            self.megabytes() / elapsed
        } else {
            0.
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub bytes: u64,
    /// Indices of segments that were not stored, in ascending order.
    pub failed: Vec<usize>,
}

impl DownloadStats {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.succeeded == self.attempted
    }
}

pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

struct Tally {
    total: usize,
    completed: usize,
    succeeded: usize,
    bytes: u64,
    failed: Vec<usize>,
}

impl Tally {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            succeeded: 0,
            bytes: 0,
            failed: Vec::new(),
        }
    }

    fn record(&mut self, index: usize, result: FetchResult) {
        self.completed += 1;
        if result.ok {
            self.succeeded += 1;
            self.bytes += result.bytes;
        } else {
            self.failed.push(index);
        }
    }

    fn progress(&self, elapsed: Duration) -> Progress {
        Progress {
            succeeded: self.succeeded,
            completed: self.completed,
            total: self.total,
            bytes: self.bytes,
            elapsed,
        }
    }

    fn into_stats(mut self) -> DownloadStats {
        self.failed.sort_unstable();
        DownloadStats {
            attempted: self.total,
            succeeded: self.succeeded,
            bytes: self.bytes,
            failed: self.failed,
        }
    }
}

/// Fetches segments with a fixed pool of workers sharing one job queue.
pub struct ParallelDownloader<F> {
    fetcher: Arc<F>,
    concurrency: NonZeroU32,
    on_progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl<F> ParallelDownloader<F>
where
    F: SegmentFetcher,
{
    pub fn new(fetcher: Arc<F>, concurrency: NonZeroU32) -> Self {
        ParallelDownloaderBuilder::new()
            .concurrency(concurrency)
            .build(fetcher)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetch all `jobs`, returning once every one of them has finished or failed.
    ///
    /// Failed segments are not retried.
    pub async fn download(&self, jobs: Vec<SegmentJob>) -> RangedlResult<DownloadStats> {
        let total = jobs.len();
        let workers = (self.concurrency.get() as usize).min(total);
        tracing::info!("Start downloading {total} segment(s) with {workers} worker(s).");

        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let tally = Arc::new(Mutex::new(Tally::new(total)));
        let started_at = Instant::now();

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            pool.spawn(worker(
                self.fetcher.clone(),
                queue.clone(),
                tally.clone(),
                self.on_progress.clone(),
                self.cancel.clone(),
                started_at,
            ));
        }

        // wait for all workers to finish
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                return Err(RangedlError::WorkerPanicked(e.to_string()));
            }
        }

        let mut tally = std::mem::replace(&mut *tally.lock().await, Tally::new(total));

        // jobs left in queue were never started because of cancellation
        let abandoned: Vec<_> = queue.lock().await.drain(..).map(|job| job.index).collect();
        if !abandoned.is_empty() {
            tracing::warn!("Download cancelled, {} segment(s) not started.", abandoned.len());
            tally.failed.extend(abandoned);
        }

        let stats = tally.into_stats();
        if !stats.failed.is_empty() {
            tracing::error!("Failed to download {} segments:", stats.failed.len());
            for index in stats.failed.iter() {
                tracing::error!("  - {index}");
            }
        }

        Ok(stats)
    }
}

async fn worker<F>(
    fetcher: Arc<F>,
    queue: Arc<Mutex<VecDeque<SegmentJob>>>,
    tally: Arc<Mutex<Tally>>,
    on_progress: Option<ProgressCallback>,
    cancel: CancellationToken,
    started_at: Instant,
) where
    F: SegmentFetcher,
{
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Some(job) = queue.lock().await.pop_front() else {
            break;
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = fetcher.fetch(&job.url, &job.slot) => Some(result),
        };

        let mut tally = tally.lock().await;
        let Some(result) = result else {
            tracing::warn!("Segment {} interrupted by cancellation.", job.index);
            tally.failed.push(job.index);
            break;
        };
        tally.record(job.index, result);
        let progress = tally.progress(started_at.elapsed());
        drop(tally);

        tracing::info!(
            "{}/{}/{} | {:.1}MB | {:.1}MB/sec",
            progress.succeeded,
            progress.completed,
            progress.total,
            progress.megabytes(),
            progress.throughput()
        );
        if let Some(on_progress) = &on_progress {
            on_progress(&progress);
        }
    }
}

pub struct ParallelDownloaderBuilder {
    concurrency: NonZeroU32,
    on_progress: Option<ProgressCallback>,
    cancel: Option<CancellationToken>,
}

impl ParallelDownloaderBuilder {
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            on_progress: None,
            cancel: None,
        }
    }

    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn on_progress<C>(mut self, callback: C) -> Self
    where
        C: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.on_progress = callback;
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build<F>(self, fetcher: Arc<F>) -> ParallelDownloader<F>
    where
        F: SegmentFetcher,
    {
        ParallelDownloader {
            fetcher,
            concurrency: self.concurrency,
            on_progress: self.on_progress,
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}

impl Default for ParallelDownloaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}
