pub mod cache;
pub mod download;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod merge;
pub mod select;
pub mod session;
pub mod track;
pub mod util;

pub use error::{RangedlError, RangedlResult};
pub use fetch::{FetchResult, HttpSegmentFetcher, SegmentFetcher};
pub use manifest::{Manifest, SegmentRef, TrackKind, Variant};
pub use session::{Session, SessionConfig};

/// ┌──────────────┐ select_best ┌─────────────┐   SegmentJob   ┌──────────────────────┐
/// │   Manifest   ├─────────────►   Variant   ├────────────────►  ParallelDownloader  │
/// │ video/audio  │             │ init + segs │                │                      │
/// └──────────────┘             └──────┬──────┘                │  worker 1 ── fetch   │
///                                     │                       │  worker 2 ── fetch   │
///                                     │ write_init            │  ...                 │
///                                     │                       │  worker W ── fetch   │
///                              ┌──────▼──────┐   slot files   └──────────┬───────────┘
///                              │ SegmentCache◄───────────────────────────┘
///                              └──────┬──────┘
///                                     │ concat_merge (index order)
///                              ┌──────▼──────┐               ┌──────────────────────┐
///                              │  *_FULL.mp4 ├──── video ────►                      │
///                              └─────────────┘               │     Muxer (ffmpeg)   ├──► output
///                              ┌─────────────┐               │                      │
///                              │  *_FULL.mp4 ├──── audio ────►                      │
///                              └─────────────┘               └──────────────────────┘
///
/// Downloads the best video and audio variant described by `playlist_url`
/// and muxes them into `output`.
pub async fn download_playlist(
    config: &SessionConfig,
    playlist_url: &str,
    output: impl AsRef<std::path::Path>,
    cancel: Option<tokio_util::sync::CancellationToken>,
) -> RangedlResult<std::path::PathBuf> {
    let client = config.client()?;
    let manifest = manifest::fetch_manifest(&client, playlist_url).await?;

    let fetcher = HttpSegmentFetcher::new(client).with_timeout(config.segment_timeout);
    let muxer = match &config.ffmpeg {
        Some(path) => merge::FfmpegMuxer::new(path.clone()),
        None => merge::FfmpegMuxer::from_path()?,
    };

    let mut session = Session::new(fetcher, muxer, config.resolve_temp_dir())
        .concurrency(config.concurrency)
        .keep_temp(config.keep_temp);
    if let Some(cancel) = cancel {
        session = session.cancel_token(cancel);
    }

    session.run(&manifest, playlist_url, output.as_ref()).await
}
