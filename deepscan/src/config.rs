//! Configuration types for resolved CLI arguments.
//!
//! This module contains Config structs and their TryFrom implementations.
//! Args structs (for CLI parsing) remain in cli.rs.

use crate::cli::{MediaArgs, ModelArgs, OutputArgs, SemanticsArg};
use crate::pipeline::Pipeline;
use crate::store::SpectrogramStore;
use deepscan_detect::predict::OutputSemantics;
use deepscan_detect::resolver::{ModelResolver, ResolverConfig};
use deepscan_detect::service::ModelService;
use deepscan_detect::spectrogram::SpectrogramRenderer;
use deepscan_media::{Fetcher, MediaNormalizer, Transcoder};
use eyre::{Result, bail, ensure};
#[allow(unused_imports)]
use ort::execution_providers::*;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use std::time::Duration;

/// Resolved model configuration.
#[derive(Debug)]
pub struct ModelConfig {
    pub resolver: ResolverConfig,
}

impl TryFrom<ModelArgs> for ModelConfig {
    type Error = eyre::Error;

    fn try_from(args: ModelArgs) -> Result<Self> {
        let semantics = match (args.semantics, args.fake_index) {
            (None, None) => None,
            (Some(SemanticsArg::Sigmoid), None) => Some(OutputSemantics::Sigmoid),
            (Some(SemanticsArg::Softmax), None) => Some(OutputSemantics::Softmax),
            (Some(SemanticsArg::MultiClass) | None, fake_index) => Some(OutputSemantics::MultiClass {
                fake_index: fake_index.unwrap_or(0),
            }),
            (Some(semantics), Some(_)) => {
                bail!("--fake-index only applies to multi-class output, not {semantics:?}")
            }
        };

        let mut resolver = ResolverConfig {
            semantics,
            ..ResolverConfig::with_model_dir(args.model_dir)
        };
        if !args.priority.is_empty() {
            resolver.priority = args.priority;
        }

        Ok(Self { resolver })
    }
}

impl ModelConfig {
    /// Lazily-loading model service using the configured execution providers.
    pub fn into_service(self) -> ModelService {
        ModelService::new(ModelResolver::new(self.resolver).with_session_factory(session_builder))
    }
}

/// Resolved media normalization configuration.
#[derive(Debug)]
pub struct MediaConfig {
    pub normalizer: MediaNormalizer,
}

impl TryFrom<MediaArgs> for MediaConfig {
    type Error = eyre::Error;

    fn try_from(args: MediaArgs) -> Result<Self> {
        ensure!(args.transcode_timeout > 0, "transcode timeout must be positive");
        ensure!(args.fetch_timeout > 0, "fetch timeout must be positive");

        Ok(Self {
            normalizer: MediaNormalizer {
                transcoder: Transcoder {
                    program: args.ffmpeg,
                    timeout: Duration::from_secs(args.transcode_timeout),
                    ..Transcoder::default()
                },
                fetcher: Fetcher {
                    program: args.yt_dlp,
                    timeout: Duration::from_secs(args.fetch_timeout),
                    ..Fetcher::default()
                },
                scratch_root: args.scratch_dir,
            },
        })
    }
}

/// Resolved spectrogram configuration.
#[derive(Debug)]
pub struct OutputConfig {
    pub renderer: SpectrogramRenderer,
    pub store: SpectrogramStore,
}

impl TryFrom<OutputArgs> for OutputConfig {
    type Error = eyre::Error;

    fn try_from(args: OutputArgs) -> Result<Self> {
        ensure!(
            args.width > 0 && args.height > 0,
            "invalid spectrogram size: {}x{}",
            args.width,
            args.height
        );

        Ok(Self {
            renderer: SpectrogramRenderer::new(args.width, args.height),
            store: SpectrogramStore::in_static_dir(args.static_dir),
        })
    }
}

/// Everything needed to build a [`Pipeline`].
#[derive(Debug)]
pub struct PipelineConfig {
    pub model: ModelConfig,
    pub media: MediaConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn from_args(model: ModelArgs, media: MediaArgs, output: OutputArgs) -> Result<Self> {
        Ok(Self {
            model: model.try_into()?,
            media: media.try_into()?,
            output: output.try_into()?,
        })
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.model.into_service())
            .with_normalizer(self.media.normalizer)
            .with_renderer(self.output.renderer)
            .with_store(self.output.store)
    }
}

/// Session builder with execution providers configured by Cargo features.
///
/// Providers are registered in priority order. The first available provider
/// is used; CPU is always available as fallback.
///
/// # Execution Providers
///
/// Enabled via Cargo features:
/// - `cuda` - NVIDIA CUDA
/// - `tensorrt` - NVIDIA TensorRT
/// - `openvino` - Intel OpenVINO
/// - `directml` - DirectML (Windows)
/// - `coreml` - CoreML (macOS)
pub fn session_builder() -> ort::Result<SessionBuilder> {
    let builder = Session::builder()?.with_execution_providers([
        #[cfg(feature = "cuda")]
        CUDAExecutionProvider::default().build(),
        #[cfg(feature = "tensorrt")]
        TensorRTExecutionProvider::default().build(),
        #[cfg(feature = "openvino")]
        OpenVINOExecutionProvider::default()
            .with_device_type("HETERO:GPU,CPU")
            .with_cache_dir(".cache/ort")
            .with_precision("FP16")
            .build(),
        #[cfg(feature = "directml")]
        DirectMLExecutionProvider::default().build(),
        #[cfg(feature = "coreml")]
        CoreMLExecutionProvider::default().build(),
    ])?;

    Ok(builder)
}
