use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};

use crate::{
    error::{RangedlError, RangedlResult},
    util::path::{remove_file_if_exists, RangedlPathExt},
};

/// Concat the init segment and segments `0..segment_count` into `output_path`.
///
/// Every expected segment is checked before anything is written. The output is
/// written to a `.part` file first, so a failed merge leaves nothing at
/// `output_path`. Returns the number of bytes written.
pub async fn concat_merge(
    init_path: &Path,
    segments: &BTreeMap<usize, PathBuf>,
    segment_count: usize,
    output_path: &Path,
) -> RangedlResult<u64> {
    let init_exists = tokio::fs::metadata(init_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or_default();
    if !init_exists {
        return Err(RangedlError::MissingInitSegment(init_path.to_path_buf()));
    }
    if let Some(missing) = (0..segment_count).find(|index| !segments.contains_key(index)) {
        return Err(RangedlError::MissingSegment(missing));
    }
    if let Some((index, path)) = segments.range(segment_count..).next() {
        tracing::warn!(
            "Ignoring unexpected segment {index} at {}, only {segment_count} expected.",
            path.display()
        );
    }

    let part = output_path.part_path();
    let written = match write_concat(init_path, segments, segment_count, &part).await {
        Ok(written) => written,
        Err(e) => {
            if let Err(e) = remove_file_if_exists(&part).await {
                tracing::warn!("Failed to remove {}: {e}", part.display());
            }
            return Err(e);
        }
    };
    tokio::fs::rename(&part, output_path).await?;

    Ok(written)
}

async fn write_concat(
    init_path: &Path,
    segments: &BTreeMap<usize, PathBuf>,
    segment_count: usize,
    output_path: &Path,
) -> RangedlResult<u64> {
    let mut output = BufWriter::new(File::create(output_path).await?);

    let mut init = File::open(init_path).await?;
    let mut written = tokio::io::copy(&mut init, &mut output).await?;

    // BTreeMap iterates in ascending index order
    for path in segments.range(..segment_count).map(|(_, path)| path) {
        let mut segment = File::open(path).await?;
        written += tokio::io::copy(&mut segment, &mut output).await?;
    }

    output.flush().await?;
    Ok(written)
}
