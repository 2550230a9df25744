use std::path::PathBuf;

use crate::{
    cache::{track_prefix, SegmentCache},
    download::{ParallelDownloader, SegmentJob},
    error::{RangedlError, RangedlResult},
    fetch::SegmentFetcher,
    manifest::{Manifest, TrackKind},
    merge::concat_merge,
    select::select_best,
};

/// Download and reassemble the best variant of one kind.
///
/// Returns the path of the merged `{prefix}_FULL.mp4` inside the cache
/// directory. Any segment that could not be fetched fails the whole track;
/// downloaded segments are removed either way.
pub async fn process_track<F>(
    manifest: &Manifest,
    kind: TrackKind,
    base_url: &str,
    cache: &SegmentCache,
    downloader: &ParallelDownloader<F>,
) -> RangedlResult<PathBuf>
where
    F: SegmentFetcher,
{
    let variant = select_best(manifest.variants(kind), kind)?;
    let prefix = track_prefix(&variant.id, kind);

    tracing::info!("{}", "=".repeat(50));
    tracing::info!("Processing {}: {}", kind.as_str().to_uppercase(), variant.id);

    let init_path = cache.write_init(&prefix, &variant.init_segment).await?;
    let jobs: Vec<_> = variant
        .segments
        .iter()
        .enumerate()
        .map(|(index, segment)| SegmentJob {
            index,
            url: format!("{base_url}{}", segment.url),
            slot: cache.segment_path(&prefix, index),
        })
        .collect();
    let segment_count = jobs.len();

    let output_path = cache.merged_path(&prefix);
    let result: RangedlResult<()> = async {
        let stats = downloader.download(jobs).await?;
        if downloader.is_cancelled() {
            return Err(RangedlError::Cancelled);
        }
        tracing::info!(
            "Downloaded {}/{} segment(s) of {prefix}, {} bytes.",
            stats.succeeded,
            stats.attempted,
            stats.bytes
        );

        let segments = cache.segments(&prefix).await?;
        let written = concat_merge(&init_path, &segments, segment_count, &output_path).await?;
        tracing::info!("Merged {prefix} into {} ({written} bytes).", output_path.display());
        Ok(())
    }
    .await;

    cache.invalidate(&prefix).await;

    result.map(|_| output_path)
}
