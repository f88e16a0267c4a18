//! Detect subcommand - analyze a local audio or video file.

use crate::cli::{GlobalArgs, MediaArgs, ModelArgs, OutputArgs};
use crate::config::PipelineConfig;
use deepscan_media::MediaSource;
use eyre::{Context, Result};
use std::path::PathBuf;

/// CLI arguments for local file analysis.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Path to input audio or video file
    pub path: PathBuf,

    /// Name reported in the result (default: the input's file name)
    #[arg(long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub media: MediaArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Resolved configuration for local file analysis.
#[derive(Debug)]
pub struct Config {
    pub path: PathBuf,
    pub name: Option<String>,
    pub pipeline: PipelineConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let name = args.name.or_else(|| {
            args.path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        });

        Ok(Self {
            path: args.path,
            name,
            pipeline: PipelineConfig::from_args(args.model, args.media, args.output)?,
        })
    }
}

pub async fn execute(config: Config, global: GlobalArgs) -> Result<()> {
    tracing::info!(input = ?config.path.display(), "analyzing file");

    let bytes = tokio::fs::read(&config.path)
        .await
        .wrap_err_with(|| format!("failed to read input: {:?}", config.path.display()))?;

    let source = MediaSource::upload(bytes, config.name);
    crate::cli::analyze(config.pipeline.build(), source, global).await
}
