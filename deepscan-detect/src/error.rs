//! Error types for deepscan-detect organized by processing stage.

use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use safetensors::SafeTensorError;
use std::path::PathBuf;
use thiserror::Error;

/// Detection pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Audio loading stage error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Spectrogram rendering error
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Model resolution and loading error
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Forward pass or output interpretation error
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Audio loading and resampling errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// WAV header declares no channels
    #[error("invalid channel count: expected at least one channel, got {0}")]
    InvalidChannels(u16),

    /// Resampler could not be built for the given rates
    #[error("failed to build resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Resampler failed while processing
    #[error("failed to resample audio: {0}")]
    Resample(#[from] rubato::ResampleError),

    /// IO error during audio loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Spectrogram rendering errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Target image has a zero dimension
    #[error("invalid image size: {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    /// PNG encoder error
    #[error(transparent)]
    Png(#[from] png::EncodingError),

    /// ndarray-stats min/max error
    #[error(transparent)]
    MinMax(#[from] MinMaxError),
}

/// Model resolution and loading errors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// No candidate artifact in the model directory
    #[error("no model found in {}; expected one of {candidates:?}", dir.display())]
    NotFound {
        dir: PathBuf,
        candidates: Vec<String>,
    },

    /// Artifact format carries weights only, no architecture
    #[error("{} does not embed a model architecture", path.display())]
    NoArchitecture { path: PathBuf },

    /// Direct load failed, and the weights fallback failed or was not applicable
    #[error(
        "could not load model from {}: {direct}{}",
        path.display(),
        describe_fallback(fallback)
    )]
    Load {
        path: PathBuf,
        #[source]
        direct: Box<Error>,
        fallback: Option<Box<Error>>,
    },

    /// Weight file could not be matched against the reconstructed architecture
    #[error(transparent)]
    Weights(#[from] WeightError),

    /// ONNX Runtime error
    #[error(transparent)]
    Ort(#[from] ort::Error),
}

fn describe_fallback(fallback: &Option<Box<Error>>) -> String {
    match fallback {
        Some(e) => format!("; weights fallback failed: {e}"),
        None => String::new(),
    }
}

/// Errors matching named tensors to the reconstructed architecture.
#[derive(Debug, Error)]
pub enum WeightError {
    /// Required tensor absent from the weight file
    #[error("missing weight tensor: {name}")]
    MissingTensor { name: String },

    /// Tensor present with the wrong shape
    #[error("weight tensor {name} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Tensor stored with a dtype other than F32
    #[error("weight tensor {name} has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    /// Safetensors header or layout error
    #[error(transparent)]
    Safetensors(#[from] SafeTensorError),

    /// IO error reading the weight file
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Forward pass and output interpretation errors.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Output cardinality does not fit the configured semantics
    #[error("model output with {len} elements does not match {semantics} semantics")]
    UnexpectedOutput { semantics: String, len: usize },

    /// Output contains NaN or infinity
    #[error("model produced a non-finite output: {0}")]
    NonFinite(f32),

    /// Session mutex poisoned by a panicking forward pass
    #[error("model session lock poisoned")]
    Poisoned,

    /// ONNX Runtime error
    #[error(transparent)]
    Ort(#[from] ort::Error),

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Result type alias for deepscan-detect operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}

// std::io::Error → AudioError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Audio(AudioError::Io(e))
    }
}

// png::EncodingError → RenderError → Error
impl From<png::EncodingError> for Error {
    fn from(e: png::EncodingError) -> Self {
        Error::Render(RenderError::Png(e))
    }
}

// WeightError → ModelError → Error
impl From<WeightError> for Error {
    fn from(e: WeightError) -> Self {
        Error::Model(ModelError::Weights(e))
    }
}
