//! Core traits for detection components.

use crate::error::InferenceError;
use ndarray::{ArrayD, ArrayView4};

/// Binary classifier over a fixed-shape MFCC feature tensor.
///
/// Implementors return the raw head output; interpretation into a
/// probability is done by [`crate::predict::OutputSemantics`].
///
/// Takes `&self` so a loaded model can be shared across requests; backends
/// that need exclusive access (ONNX Runtime's `Session::run`) lock internally.
pub trait Classifier: Send + Sync {
    /// Run one forward pass on a `(1, 40, 500, 1)` tensor.
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, InferenceError>;
}

impl<F> Classifier for F
where
    F: Fn(ArrayView4<'_, f32>) -> Result<ArrayD<f32>, InferenceError> + Send + Sync,
{
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        self(input)
    }
}
