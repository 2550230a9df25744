use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::TrackKind;

#[derive(Error, Debug)]
pub enum RangedlError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("No {0} variant available in playlist")]
    EmptyVariantList(TrackKind),

    #[error("Init segment missing: {}", .0.display())]
    MissingInitSegment(PathBuf),

    #[error("Segment {0} is missing")]
    MissingSegment(usize),

    #[error("FFmpeg exited with code {code:?}: {stderr}")]
    MuxFailure { code: Option<i32>, stderr: String },

    #[error("Download cancelled")]
    Cancelled,

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Download worker panicked: {0}")]
    WorkerPanicked(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    MissingExecutable(#[from] which::Error),
}

pub type RangedlResult<T> = Result<T, RangedlError>;
