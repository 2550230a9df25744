mod concat;
mod ffmpeg;

pub use concat::concat_merge;
pub use ffmpeg::{FfmpegMuxer, Muxer};
