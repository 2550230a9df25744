use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

pub trait RangedlPathExt {
    /// Sibling path used while the file is still being written.
    ///
    /// `seg_0001.mp4` becomes `seg_0001.mp4.part`.
    fn part_path(&self) -> PathBuf;
}

impl RangedlPathExt for Path {
    fn part_path(&self) -> PathBuf {
        let mut filename = OsString::new();
        if let Some(name) = self.file_name() {
            filename.push(name);
        }
        filename.push(".part");

        self.with_file_name(filename)
    }
}

/// Remove a file, treating an already missing file as success.
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}
