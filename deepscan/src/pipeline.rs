//! Request orchestration from raw media to a prediction report.

use crate::store::{SpectrogramStore, StoredSpectrogram};
use deepscan_detect::audio::Waveform;
use deepscan_detect::error::{InferenceError, ModelError};
use deepscan_detect::mfcc::extract_features;
use deepscan_detect::models::ModelHandle;
use deepscan_detect::service::ModelService;
use deepscan_detect::spectrogram::{SpectrogramImage, SpectrogramRenderer};
use deepscan_detect::types::{Label, Prediction};
use deepscan_media::{MediaError, MediaNormalizer, MediaSource};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::{JoinError, spawn_blocking};

/// Failure of one analysis, named after the stage that raised it.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Nothing usable in the request
    #[error(transparent)]
    Input(MediaError),

    /// Remote media could not be fetched
    #[error(transparent)]
    Download(MediaError),

    #[error("Audio conversion failed: {0}")]
    Conversion(#[source] MediaError),

    /// Scratch files for the request could not be created, written or read
    #[error("scratch storage failed: {0}")]
    Scratch(#[source] MediaError),

    #[error("Audio decoding failed: {0}")]
    Audio(#[source] deepscan_detect::Error),

    #[error("Spectrogram generation failed: {0}")]
    Spectrogram(#[source] deepscan_detect::Error),

    #[error("Spectrogram generation failed: could not save image: {0}")]
    Persist(#[source] std::io::Error),

    #[error("Model not loaded on server: {0}")]
    ModelNotLoaded(#[source] ModelError),

    #[error("Inference error: {0}")]
    Inference(#[source] InferenceError),

    /// A blocking stage panicked or was cancelled
    #[error("analysis task failed: {0}")]
    Task(#[from] JoinError),
}

impl AnalysisError {
    /// HTTP-style status: 400 for bad requests, 500 for everything else.
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::Input(_) => 400,
            _ => 500,
        }
    }
}

impl From<MediaError> for AnalysisError {
    fn from(e: MediaError) -> Self {
        if e.is_input() {
            AnalysisError::Input(e)
        } else if e.is_download() {
            AnalysisError::Download(e)
        } else if matches!(e, MediaError::Io(_)) {
            AnalysisError::Scratch(e)
        } else {
            AnalysisError::Conversion(e)
        }
    }
}

/// Class probabilities in the report.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Probabilities {
    pub fake: f32,
    pub real: f32,
}

/// Result of one successful analysis.
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub prediction: Label,
    pub confidence: f32,
    pub probabilities: Probabilities,
    pub model_file: String,
    /// Spectrogram PNG as a data URI
    pub spectrogram: String,
    /// Public path of the stored spectrogram
    pub spectrogram_path: String,
    pub file_name: String,
    /// Wall-clock seconds, rounded to milliseconds
    pub analysis_time: f64,
}

impl AnalysisReport {
    fn new(
        prediction: Prediction,
        image: &SpectrogramImage,
        stored: StoredSpectrogram,
        file_name: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            prediction: prediction.label,
            confidence: prediction.confidence,
            probabilities: Probabilities {
                fake: prediction.fake_probability,
                real: prediction.real_probability,
            },
            model_file: prediction.model_file,
            spectrogram: image.to_data_uri(),
            spectrogram_path: stored.public_path,
            file_name,
            analysis_time: round_millis(elapsed),
        }
    }
}

fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

/// One analysis path for uploads and URLs alike.
///
/// Cheap to share behind an `Arc`; the model is loaded once and reused by
/// every request.
#[derive(Debug)]
pub struct Pipeline {
    normalizer: MediaNormalizer,
    renderer: SpectrogramRenderer,
    store: SpectrogramStore,
    model: Arc<ModelService>,
}

impl Pipeline {
    pub fn new(model: ModelService) -> Self {
        Self {
            normalizer: MediaNormalizer::default(),
            renderer: SpectrogramRenderer::default(),
            store: SpectrogramStore::default(),
            model: Arc::new(model),
        }
    }

    pub fn with_normalizer(mut self, normalizer: MediaNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_renderer(mut self, renderer: SpectrogramRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_store(mut self, store: SpectrogramStore) -> Self {
        self.store = store;
        self
    }

    pub fn model(&self) -> &ModelService {
        &self.model
    }

    /// Resolve the model off the async runtime, loading it on first use.
    pub async fn preload(&self) -> Result<Arc<ModelHandle>, AnalysisError> {
        let model = Arc::clone(&self.model);
        spawn_blocking(move || model.resolve())
            .await?
            .map_err(AnalysisError::ModelNotLoaded)
    }

    /// Normalize, render, classify.
    ///
    /// Scratch files are gone by the time this returns, on success or
    /// failure. A spectrogram is only kept when a report references it.
    pub async fn analyze(&self, source: MediaSource) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();
        let file_name = source.display_name();
        tracing::info!(source = %file_name, "analysis started");

        let media = self.normalizer.normalize(&source).await?;

        let wav_path = media.wav_path().to_path_buf();
        let renderer = self.renderer;
        let (waveform, image) = spawn_blocking(move || -> Result<_, AnalysisError> {
            let waveform = Waveform::from_file(&wav_path).map_err(AnalysisError::Audio)?;
            let image = renderer
                .render(&waveform)
                .map_err(AnalysisError::Spectrogram)?;
            Ok((waveform, image))
        })
        .await??;
        drop(media);

        tracing::info!(duration_secs = waveform.duration_secs(), "audio decoded");

        let stored = self
            .store
            .save(&image.png)
            .await
            .map_err(AnalysisError::Persist)?;

        let prediction = match self.classify(waveform).await {
            Ok(prediction) => prediction,
            Err(e) => {
                self.store.discard(&stored).await;
                return Err(e);
            }
        };

        let report = AnalysisReport::new(prediction, &image, stored, file_name, started.elapsed());
        tracing::info!(
            prediction = %report.prediction,
            confidence = report.confidence,
            analysis_time = report.analysis_time,
            "analysis completed"
        );

        Ok(report)
    }

    async fn classify(&self, waveform: Waveform) -> Result<Prediction, AnalysisError> {
        let handle = self.preload().await?;

        spawn_blocking(move || {
            let features = extract_features(&waveform);
            handle.predict(&features)
        })
        .await?
        .map_err(AnalysisError::Inference)
    }
}
