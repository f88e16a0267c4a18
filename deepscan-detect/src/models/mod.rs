//! Classifier backends and the loaded-model handle.

pub mod cnn_bilstm;
pub mod onnx;

use crate::error::InferenceError;
use crate::mfcc::FeatureTensor;
use crate::predict::OutputSemantics;
use crate::traits::Classifier;
use crate::types::{LoadPath, Prediction};
use std::fmt;

/// A ready-to-use classifier with its fixed output interpretation.
pub struct ModelHandle {
    classifier: Box<dyn Classifier>,
    model_file: String,
    load_path: LoadPath,
    semantics: OutputSemantics,
}

impl ModelHandle {
    pub(crate) fn loaded(
        classifier: Box<dyn Classifier>,
        model_file: String,
        load_path: LoadPath,
        semantics: OutputSemantics,
    ) -> Self {
        Self {
            classifier,
            model_file,
            load_path,
            semantics,
        }
    }

    /// Wrap a caller-built classifier, e.g. a stand-in for tests.
    pub fn new(
        classifier: impl Classifier + 'static,
        model_file: impl Into<String>,
        semantics: OutputSemantics,
    ) -> Self {
        Self::loaded(
            Box::new(classifier),
            model_file.into(),
            LoadPath::Injected,
            semantics,
        )
    }

    /// File name of the artifact this handle was loaded from.
    pub fn model_file(&self) -> &str {
        &self.model_file
    }

    pub fn load_path(&self) -> LoadPath {
        self.load_path
    }

    pub fn semantics(&self) -> OutputSemantics {
        self.semantics
    }

    /// Run the classifier and calibrate its output.
    pub fn predict(&self, features: &FeatureTensor) -> Result<Prediction, InferenceError> {
        let output = self.classifier.forward(features.view())?;
        tracing::debug!(shape = ?output.shape(), "classifier output");
        self.semantics.interpret(output.view(), &self.model_file)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_file", &self.model_file)
            .field("load_path", &self.load_path)
            .field("semantics", &self.semantics)
            .finish_non_exhaustive()
    }
}

/// Derive output semantics from one forward pass on an all-zero tensor.
pub(crate) fn probe_semantics(
    classifier: &dyn Classifier,
) -> Result<OutputSemantics, InferenceError> {
    let output = classifier.forward(FeatureTensor::zeros().view())?;
    let semantics = OutputSemantics::from_cardinality(output.len());
    tracing::debug!(shape = ?output.shape(), %semantics, "probed model output");
    Ok(semantics)
}
