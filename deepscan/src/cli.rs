//! CLI argument definitions using clap.

use crate::pipeline::{AnalysisError, Pipeline};
use clap::{Parser, Subcommand, ValueEnum};
use deepscan_detect::resolver::DEFAULT_MODEL_DIR;
use deepscan_media::MediaSource;
use deepscan_media::fetch::DEFAULT_FETCH_TIMEOUT;
use deepscan_media::transcode::DEFAULT_TRANSCODE_TIMEOUT;
use eyre::Result;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "deepscan")]
#[command(about = "Deepfake audio detection for local files and remote media")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze a local audio or video file
    Detect(crate::detect::Args),

    /// Download media from a URL and analyze its audio
    Url(crate::url::Args),

    /// Resolve and load the classifier, then describe it
    Model(crate::model::Args),
}

/// Options shared by every subcommand.
#[derive(clap::Args, Clone, Copy, Debug, Default)]
pub struct GlobalArgs {
    /// Load the model before processing input
    #[arg(long, global = true)]
    pub preload: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,
}

/// Where to find the classifier and how to read its output.
#[derive(clap::Args, Debug, Clone)]
pub struct ModelArgs {
    /// Directory searched for model artifacts
    #[arg(long, env = "DEEPSCAN_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
    pub model_dir: PathBuf,

    /// Artifact file name to try first; repeat to build a priority list
    #[arg(long = "model", value_name = "FILE")]
    pub priority: Vec<String>,

    /// Output semantics of the classifier head (default: probe the model)
    #[arg(long, value_enum)]
    pub semantics: Option<SemanticsArg>,

    /// Output index of the fake class; implies `--semantics multi-class`
    #[arg(long)]
    pub fake_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SemanticsArg {
    Sigmoid,
    Softmax,
    MultiClass,
}

/// External tools and scratch space for media normalization.
#[derive(clap::Args, Debug, Clone)]
pub struct MediaArgs {
    /// ffmpeg executable
    #[arg(long, env = "DEEPSCAN_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// yt-dlp executable
    #[arg(long, env = "DEEPSCAN_YT_DLP", default_value = "yt-dlp")]
    pub yt_dlp: PathBuf,

    /// Seconds before a conversion is killed
    #[arg(long, default_value_t = DEFAULT_TRANSCODE_TIMEOUT.as_secs())]
    pub transcode_timeout: u64,

    /// Seconds before a download is killed
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT.as_secs())]
    pub fetch_timeout: u64,

    /// Parent directory for per-request scratch files (default: system temp)
    #[arg(long, env = "DEEPSCAN_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,
}

/// Spectrogram rendering and storage.
#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    /// Static-serving root; spectrograms go to `<dir>/spectrograms`
    #[arg(long, env = "DEEPSCAN_STATIC_DIR", default_value = crate::store::DEFAULT_STATIC_DIR)]
    pub static_dir: PathBuf,

    /// Spectrogram width in pixels
    #[arg(long, default_value_t = 512)]
    pub width: u32,

    /// Spectrogram height in pixels
    #[arg(long, default_value_t = 256)]
    pub height: u32,
}

/// Execute CLI command - separated for testing.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Detect(args) => crate::detect::execute(args.try_into()?, cli.global).await,
        Commands::Url(args) => crate::url::execute(args.try_into()?, cli.global).await,
        Commands::Model(args) => crate::model::execute(args.try_into()?, cli.global).await,
    }
}

/// Analyze `source` and print the report, or the failure, as JSON.
pub(crate) async fn analyze(
    pipeline: Pipeline,
    source: MediaSource,
    global: GlobalArgs,
) -> Result<()> {
    if global.preload {
        match pipeline.preload().await {
            Ok(handle) => tracing::info!(model = handle.model_file(), "model preloaded"),
            Err(e) => tracing::warn!(error = %e, "model preload failed"),
        }
    }

    match pipeline.analyze(source).await {
        Ok(report) => print_json(&report, global.pretty),
        Err(e) => {
            print_json(&ErrorReport::from(&e), global.pretty)?;
            Err(e.into())
        }
    }
}

/// Failure body mirroring what the HTTP layer would send.
#[derive(Debug, Serialize)]
struct ErrorReport {
    status: u16,
    detail: String,
}

impl From<&AnalysisError> for ErrorReport {
    fn from(e: &AnalysisError) -> Self {
        Self {
            status: e.status_code(),
            detail: e.to_string(),
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}
