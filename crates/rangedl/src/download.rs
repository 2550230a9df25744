mod parallel;

pub use parallel::{
    DownloadStats, ParallelDownloader, ParallelDownloaderBuilder, Progress, ProgressCallback,
    SegmentJob, DEFAULT_CONCURRENCY,
};
