//! Mapping raw classifier output to a calibrated prediction.

use crate::error::InferenceError;
use crate::types::{Label, Prediction};
use ndarray::ArrayViewD;
use serde::Serialize;
use std::fmt;

/// Fake probability at or above which a clip is labelled fake.
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Denominator guard for multi-class normalization.
const NORM_EPSILON: f32 = 1e-9;

/// Meaning of the classifier head, fixed when the model is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSemantics {
    /// Single value: fake probability
    Sigmoid,
    /// Two values: `[real, fake]`
    Softmax,
    /// More than two values, L1-normalized; `fake_index` picks the fake class
    MultiClass { fake_index: usize },
}

impl OutputSemantics {
    /// Derive semantics from the number of output elements.
    pub fn from_cardinality(len: usize) -> Self {
        match len {
            0 | 1 => OutputSemantics::Sigmoid,
            2 => OutputSemantics::Softmax,
            _ => OutputSemantics::MultiClass { fake_index: 0 },
        }
    }

    /// Extract the fake probability from a raw output of any shape.
    pub fn fake_probability(&self, output: ArrayViewD<f32>) -> Result<f32, InferenceError> {
        let values: Vec<f32> = output.iter().copied().collect();

        if let Some(&bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(InferenceError::NonFinite(bad));
        }

        let unexpected = || InferenceError::UnexpectedOutput {
            semantics: self.to_string(),
            len: values.len(),
        };

        let fake = match *self {
            OutputSemantics::Sigmoid => match values.as_slice() {
                [p] => *p,
                _ => return Err(unexpected()),
            },
            OutputSemantics::Softmax => match values.as_slice() {
                [_real, fake] => *fake,
                _ => return Err(unexpected()),
            },
            OutputSemantics::MultiClass { fake_index } => {
                if values.len() <= 2 || fake_index >= values.len() {
                    return Err(unexpected());
                }
                let sum: f32 = values.iter().sum();
                values[fake_index] / (sum + NORM_EPSILON)
            }
        };

        if !(0.0..=1.0).contains(&fake) {
            tracing::warn!(fake, semantics = %self, "fake probability outside [0, 1], clamping");
        }

        Ok(fake.clamp(0.0, 1.0))
    }

    /// Interpret a raw output as a [`Prediction`].
    pub fn interpret(
        &self,
        output: ArrayViewD<f32>,
        model_file: &str,
    ) -> Result<Prediction, InferenceError> {
        let fake = self.fake_probability(output)?;
        Ok(prediction_from_fake(fake, model_file))
    }
}

impl fmt::Display for OutputSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSemantics::Sigmoid => f.write_str("sigmoid"),
            OutputSemantics::Softmax => f.write_str("softmax"),
            OutputSemantics::MultiClass { fake_index } => {
                write!(f, "multi-class (fake index {fake_index})")
            }
        }
    }
}

/// Build a prediction from a fake probability in `[0, 1]`.
pub fn prediction_from_fake(fake_probability: f32, model_file: &str) -> Prediction {
    let real_probability = 1.0 - fake_probability;
    let label = if fake_probability >= DECISION_THRESHOLD {
        Label::Fake
    } else {
        Label::Real
    };

    Prediction {
        label,
        fake_probability,
        real_probability,
        confidence: fake_probability.max(real_probability),
        model_file: model_file.to_string(),
    }
}
