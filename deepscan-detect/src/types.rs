//! Core types for deepscan-detect

use serde::Serialize;
use std::fmt;

/// Classification outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Real => "real",
            Label::Fake => "fake",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calibrated two-class prediction.
///
/// `real_probability` is always derived as `1 - fake_probability`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    pub fake_probability: f32,
    pub real_probability: f32,
    /// `max(fake_probability, real_probability)`
    pub confidence: f32,
    /// File name of the model artifact that produced this prediction
    pub model_file: String,
}

/// How a model artifact was materialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPath {
    /// Full model deserialized from the artifact
    Direct,
    /// Weights loaded into the reconstructed architecture
    Reconstructed,
    /// Handle supplied by the caller
    Injected,
}
