use std::{num::NonZeroU32, path::PathBuf, time::Duration};

use clap::Parser;
use rangedl::{download::DEFAULT_CONCURRENCY, util::http::parse_headers, SessionConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[clap(name = "rangedl", about, version)]
pub struct RangedlArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Segments downloaded at the same time
    #[clap(long, alias = "threads", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: NonZeroU32,

    /// Segment request timeout, in seconds
    #[clap(short, long, default_value = "20")]
    timeout: u64,

    /// Additional HTTP headers
    ///
    /// Custom header. eg. "Referer: https://example.com/"
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Temporary file path
    #[clap(long, env = "TEMP")]
    temp_dir: Option<PathBuf>,

    /// Keep temporary files after muxing
    #[clap(short, long, alias = "keep-temp")]
    keep: bool,

    /// Path to the ffmpeg executable
    #[clap(long)]
    ffmpeg: Option<PathBuf>,

    /// Playlist url
    url: String,

    /// Output file path
    output: PathBuf,
}

impl RangedlArgs {
    fn config(&self) -> anyhow::Result<SessionConfig> {
        Ok(SessionConfig {
            concurrency: self.concurrency,
            segment_timeout: Duration::from_secs(self.timeout),
            headers: parse_headers(&self.headers)?,
            temp_dir: self.temp_dir.clone(),
            keep_temp: self.keep,
            ffmpeg: self.ffmpeg.clone(),
            ..Default::default()
        })
    }
}

fn cancel_on_ctrlc() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        // wait for the first ctrl-c to stop downloader
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Ctrl-C received, stopping downloader.");
        token.cancel();

        // wait for the second ctrl-c to force exit
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received again, force exit.");
            std::process::exit(1);
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = RangedlArgs::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.config()?;
    let cancel = cancel_on_ctrlc();
    rangedl::download_playlist(&config, &args.url, &args.output, Some(cancel)).await?;

    Ok(())
}
