//! Full-model artifacts executed with ONNX Runtime.

use crate::error::{InferenceError, ModelError};
use crate::traits::Classifier;
use ndarray::{ArrayD, ArrayView4};
use ort::inputs;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;

/// Classifier backed by an ONNX Runtime session.
///
/// The graph is expected to take one `(1, 40, 500, 1)` float input and
/// produce the classification head as its first output.
pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl OnnxClassifier {
    /// Load an ONNX graph with the given session builder.
    pub fn from_file(path: &Path, builder: SessionBuilder) -> Result<Self, ModelError> {
        let session = builder.commit_from_file(path)?;

        tracing::debug!(
            inputs = session.inputs.len(),
            outputs = session.outputs.len(),
            "onnx session ready"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        let input = Value::from_array(input.to_owned())?;

        let mut session = self.session.lock().map_err(|_| InferenceError::Poisoned)?;
        let outputs = session.run(inputs![input])?;
        let output = outputs[0].try_extract_array::<f32>()?.to_owned();

        Ok(output)
    }
}
