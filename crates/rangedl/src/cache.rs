use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{error::RangedlResult, manifest::TrackKind, util::path::remove_file_if_exists};

const INIT_SUFFIX: &str = "_init_segment.mp4";
const SEGMENT_INFIX: &str = "_seg_";
const SEGMENT_EXT: &str = ".mp4";
const MERGED_SUFFIX: &str = "_FULL.mp4";
const PART_EXT: &str = ".part";

/// Directory storing downloaded but not merged segments.
///
/// Every track owns a distinct `prefix`, so several tracks can share one directory:
///
/// - `{prefix}_init_segment.mp4`
/// - `{prefix}_seg_{index:04}.mp4`
/// - `{prefix}_FULL.mp4`
pub struct SegmentCache {
    cache_dir: PathBuf,
}

impl SegmentCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub async fn ensure_cache_dir(&self) -> RangedlResult<()> {
        if !self.cache_dir.exists() {
            tokio::fs::create_dir_all(&self.cache_dir).await?;
        }

        Ok(())
    }

    pub fn init_path(&self, prefix: &str) -> PathBuf {
        self.cache_dir.join(format!("{prefix}{INIT_SUFFIX}"))
    }

    pub fn segment_path(&self, prefix: &str, index: usize) -> PathBuf {
        self.cache_dir
            .join(format!("{prefix}{SEGMENT_INFIX}{index:04}{SEGMENT_EXT}"))
    }

    pub fn merged_path(&self, prefix: &str) -> PathBuf {
        self.cache_dir.join(format!("{prefix}{MERGED_SUFFIX}"))
    }

    pub async fn write_init(&self, prefix: &str, data: &[u8]) -> RangedlResult<PathBuf> {
        self.ensure_cache_dir().await?;

        let path = self.init_path(prefix);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }

    /// Stored segments of `prefix`, keyed by segment index.
    pub async fn segments(&self, prefix: &str) -> RangedlResult<BTreeMap<usize, PathBuf>> {
        let mut segments = BTreeMap::new();
        if !self.cache_dir.exists() {
            return Ok(segments);
        }

        let mut entries = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let Some(index) = filename.to_str().and_then(|f| parse_segment_index(f, prefix)) else {
                continue;
            };
            segments.insert(index, entry.path());
        }
        Ok(segments)
    }

    /// Remove the init segment and every stored segment of `prefix`, including
    /// `.part` files of fetches that never finished.
    ///
    /// Failures are logged and do not stop the removal of other files.
    pub async fn invalidate(&self, prefix: &str) {
        if let Err(e) = remove_file_if_exists(&self.init_path(prefix)).await {
            tracing::warn!("Cleanup warning: {e}");
        }

        let stored = match self.stored_files(prefix).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Cleanup warning: {e}");
                return;
            }
        };
        for path in stored {
            if let Err(e) = remove_file_if_exists(&path).await {
                tracing::warn!("Cleanup warning: {}: {e}", path.display());
            }
        }
    }

    async fn stored_files(&self, prefix: &str) -> RangedlResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name();
            let Some(filename) = filename.to_str() else {
                continue;
            };
            let filename = filename.strip_suffix(PART_EXT).unwrap_or(filename);
            if parse_segment_index(filename, prefix).is_some() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    pub async fn clear(&self) -> RangedlResult<()> {
        if self.cache_dir.exists() {
            tokio::fs::remove_dir_all(&self.cache_dir).await?;
        }
        Ok(())
    }

    pub fn location_hint(&self) -> String {
        self.cache_dir.display().to_string()
    }
}

/// File name prefix of one track.
///
/// Variant ids come from the remote playlist, so path separators are replaced
/// to keep every file inside the cache directory.
pub fn track_prefix(id: &str, kind: TrackKind) -> String {
    let id = id.replace(['/', '\\'], "__");
    format!("{id}_{kind}")
}

fn parse_segment_index(filename: &str, prefix: &str) -> Option<usize> {
    filename
        .strip_prefix(prefix)?
        .strip_prefix(SEGMENT_INFIX)?
        .strip_suffix(SEGMENT_EXT)?
        .parse()
        .ok()
}
