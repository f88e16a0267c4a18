//! Process-wide model access with single-flight lazy loading.

use crate::error::{ModelError, Result};
use crate::mfcc::FeatureTensor;
use crate::models::ModelHandle;
use crate::resolver::{ModelResolver, ResolverConfig};
use crate::types::Prediction;
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Owns the resolver and the loaded model.
///
/// The first call to [`resolve`](Self::resolve) loads the model; concurrent
/// callers wait for that load instead of starting their own. A failed load
/// leaves the service empty, so the next call resolves again.
#[derive(Debug)]
pub struct ModelService {
    resolver: ModelResolver,
    handle: OnceCell<Arc<ModelHandle>>,
}

impl ModelService {
    pub fn new(resolver: ModelResolver) -> Self {
        Self {
            resolver,
            handle: OnceCell::new(),
        }
    }

    /// Service with an already loaded handle; the resolver is never consulted.
    pub fn with_handle(handle: ModelHandle) -> Self {
        Self {
            resolver: ModelResolver::new(ResolverConfig::default()),
            handle: OnceCell::with_value(Arc::new(handle)),
        }
    }

    /// The loaded model, loading it on first use.
    pub fn resolve(&self) -> std::result::Result<Arc<ModelHandle>, ModelError> {
        self.handle
            .get_or_try_init(|| self.resolver.load().map(Arc::new))
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Resolve the model and classify one feature tensor.
    pub fn predict(&self, features: &FeatureTensor) -> Result<Prediction> {
        let handle = self.resolve()?;
        Ok(handle.predict(features)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, InferenceError};
    use crate::models::cnn_bilstm::tests::{TINY, weight_file};
    use crate::predict::OutputSemantics;
    use crate::types::{Label, LoadPath};
    use ndarray::{ArrayD, ArrayView4, IxDyn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    fn constant(value: f32) -> ModelHandle {
        let classifier = move |_: ArrayView4<'_, f32>| -> std::result::Result<ArrayD<f32>, InferenceError> {
            Ok(ArrayD::from_elem(IxDyn(&[1, 1]), value))
        };
        ModelHandle::new(classifier, "fake.onnx", OutputSemantics::Sigmoid)
    }

    fn weights_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("my_model.safetensors"),
            weight_file(&TINY, |_| 0.0),
        )
        .unwrap();
        dir
    }

    fn tiny_service(dir: &std::path::Path) -> ModelService {
        ModelService::new(ModelResolver::new(ResolverConfig {
            architecture: TINY,
            ..ResolverConfig::with_model_dir(dir)
        }))
    }

    #[test]
    fn injected_handle_is_used() {
        let service = ModelService::with_handle(constant(0.9));

        assert!(service.is_loaded());
        let prediction = service.predict(&FeatureTensor::zeros()).unwrap();
        assert_eq!(prediction.label, Label::Fake);
        assert_eq!(prediction.model_file, "fake.onnx");
        assert_eq!(service.resolve().unwrap().load_path(), LoadPath::Injected);
    }

    #[test]
    fn resolve_is_idempotent() {
        let dir = weights_dir();
        let service = tiny_service(dir.path());

        let first = service.resolve().unwrap();
        std::fs::remove_file(dir.path().join("my_model.safetensors")).unwrap();
        let second = service.resolve().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn concurrent_first_calls_share_one_load() {
        let dir = weights_dir();
        let service = tiny_service(dir.path());

        let handles: Vec<_> = thread::scope(|scope| {
            let workers: Vec<_> = (0..4).map(|_| scope.spawn(|| service.resolve())).collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap().unwrap())
                .collect()
        });

        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn missing_model_fails_every_time_until_placed() {
        let dir = TempDir::new().unwrap();
        let service = tiny_service(dir.path());

        for _ in 0..2 {
            let err = service.predict(&FeatureTensor::zeros()).unwrap_err();
            assert!(matches!(err, Error::Model(ModelError::NotFound { .. })));
            assert!(!service.is_loaded());
        }

        std::fs::write(
            dir.path().join("my_model.safetensors"),
            weight_file(&TINY, |_| 0.0),
        )
        .unwrap();
        assert!(service.predict(&FeatureTensor::zeros()).is_ok());
        assert!(service.is_loaded());
    }

    #[test]
    fn forward_errors_surface_as_inference_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let failing = move |_: ArrayView4<'_, f32>| -> std::result::Result<ArrayD<f32>, InferenceError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(InferenceError::NonFinite(f32::NAN))
        };

        let service = ModelService::with_handle(ModelHandle::new(
            failing,
            "broken.onnx",
            OutputSemantics::Sigmoid,
        ));

        let err = service.predict(&FeatureTensor::zeros()).unwrap_err();
        assert!(matches!(err, Error::Inference(InferenceError::NonFinite(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
