//! Model subcommand - resolve and load the classifier, then describe it.

use crate::cli::{GlobalArgs, ModelArgs};
use crate::config::ModelConfig;
use deepscan_detect::predict::OutputSemantics;
use deepscan_detect::types::LoadPath;
use eyre::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// CLI arguments for model inspection.
#[derive(clap::Args, Debug)]
pub struct Args {
    #[command(flatten)]
    pub model: ModelArgs,
}

/// Resolved configuration for model inspection.
#[derive(Debug)]
pub struct Config {
    pub model: ModelConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        Ok(Self {
            model: args.model.try_into()?,
        })
    }
}

/// What was loaded and how.
#[derive(Debug, Serialize)]
struct ModelSummary {
    model_dir: PathBuf,
    model_file: String,
    load_path: LoadPath,
    semantics: OutputSemantics,
    load_time: f64,
}

pub async fn execute(config: Config, global: GlobalArgs) -> Result<()> {
    let model_dir = config.model.resolver.model_dir.clone();
    tracing::info!(dir = ?model_dir.display(), "loading model");

    let service = config.model.into_service();
    let s = Instant::now();

    let handle = tokio::task::spawn_blocking(move || service.resolve())
        .await?
        .wrap_err("failed to load model")?;

    let d = s.elapsed();
    tracing::info!(duration = %format_secs(d.as_secs_f32()), "model loaded");

    let summary = ModelSummary {
        model_dir,
        model_file: handle.model_file().to_string(),
        load_path: handle.load_path(),
        semantics: handle.semantics(),
        load_time: d.as_secs_f64(),
    };

    crate::cli::print_json(&summary, global.pretty)
}

/// Format seconds as a string with two decimal places.
fn format_secs(secs: f32) -> String {
    format!("{:.2}s", secs)
}
