use std::{
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;

use crate::error::{RangedlError, RangedlResult};

/// Combines a video track and an audio track into one output file.
pub trait Muxer: Send + Sync {
    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> impl Future<Output = RangedlResult<()>> + Send;
}

/// Mux with the ffmpeg CLI, copying both streams without re-encoding.
pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Locate `ffmpeg` in `PATH`.
    pub fn from_path() -> RangedlResult<Self> {
        let ffmpeg = which::which("ffmpeg")?;
        Ok(Self::new(ffmpeg))
    }

    fn command(&self, video: &Path, audio: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.ffmpeg);
        command
            .arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null());
        command
    }
}

impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> RangedlResult<()> {
        tracing::info!("FFmpeg processing file");

        let mut command = self.command(video, audio, output);
        tracing::debug!("Running {:?}", command.as_std());
        let result = command.output().await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
            tracing::error!("FFmpeg error: {stderr}");
            tracing::error!("Command was: {:?}", command.as_std());
            return Err(RangedlError::MuxFailure {
                code: result.status.code(),
                stderr,
            });
        }

        tracing::info!("FFmpeg mux complete");
        Ok(())
    }
}
