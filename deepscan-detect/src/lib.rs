//! deepscan-detect: feature extraction and calibrated inference for
//! deepfake audio detection.
//!
//! The crate turns a decoded waveform into the classifier's fixed-shape
//! MFCC tensor, renders a mel spectrogram for display, and resolves the
//! classifier artifact on disk into a shareable handle.
//!
//! # Architecture
//!
//! - [`audio::Waveform`]: mono 16 kHz samples decoded from WAV
//! - [`mfcc::extract_features`]: `(1, 40, 500, 1)` MFCC tensor
//! - [`spectrogram::SpectrogramRenderer`]: mel spectrogram PNG
//! - [`resolver::ModelResolver`]: priority-ordered artifact lookup with a
//!   weights-only fallback onto [`models::cnn_bilstm::CnnBiLstm`]
//! - [`service::ModelService`]: lazily loaded, shared [`models::ModelHandle`]
//! - [`predict::OutputSemantics`]: maps raw model output to a [`types::Prediction`]
//!
//! # Quick Start
//!
//! ```ignore
//! use deepscan_detect::audio::Waveform;
//! use deepscan_detect::mfcc::extract_features;
//! use deepscan_detect::resolver::{ModelResolver, ResolverConfig};
//! use deepscan_detect::service::ModelService;
//!
//! let waveform = Waveform::from_file("clip.wav")?;
//! let features = extract_features(&waveform);
//!
//! let service = ModelService::new(ModelResolver::new(ResolverConfig::default()));
//! let prediction = service.predict(&features)?;
//! println!("{} ({:.2})", prediction.label, prediction.confidence);
//! ```

pub mod audio;
pub mod error;
pub mod mel;
pub mod mfcc;
pub mod models;
pub mod predict;
pub mod resolver;
pub mod service;
pub mod spectrogram;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
