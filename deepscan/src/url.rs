//! Url subcommand - download media from a URL and analyze it.

use crate::cli::{GlobalArgs, MediaArgs, ModelArgs, OutputArgs};
use crate::config::PipelineConfig;
use deepscan_media::MediaSource;
use eyre::Result;

/// CLI arguments for URL analysis.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// URL to download
    pub url: String,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub media: MediaArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Resolved configuration for URL analysis.
#[derive(Debug)]
pub struct Config {
    pub url: String,
    pub pipeline: PipelineConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            url: args.url,
            pipeline: PipelineConfig::from_args(args.model, args.media, args.output)?,
        })
    }
}

pub async fn execute(config: Config, global: GlobalArgs) -> Result<()> {
    tracing::info!(url = config.url, "analyzing remote media");

    let source = MediaSource::url(config.url);
    crate::cli::analyze(config.pipeline.build(), source, global).await
}
