//! Locating and loading the classifier artifact.
//!
//! Candidates are tried in priority order, then any file with a recognized
//! extension. Loading first attempts the artifact as a full model; when that
//! fails and the file is weights-capable, its tensors are loaded into the
//! reconstructed [`CnnBiLstm`] instead.

use crate::error::{Error, ModelError};
use crate::models::cnn_bilstm::{CnnBiLstm, CnnBiLstmConfig};
use crate::models::onnx::OnnxClassifier;
use crate::models::{ModelHandle, probe_semantics};
use crate::predict::OutputSemantics;
use crate::traits::Classifier;
use crate::types::LoadPath;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default directory searched for model artifacts.
pub const DEFAULT_MODEL_DIR: &str = "models/savedmodels";

/// Conventional artifact names, highest priority first.
pub const DEFAULT_PRIORITY: [&str; 3] = [
    "updated_model.onnx",
    "updated_model.safetensors",
    "my_model.safetensors",
];

/// Creates the ONNX Runtime session builder for each direct load.
pub type SessionFactory = Box<dyn Fn() -> ort::Result<SessionBuilder> + Send + Sync>;

/// Where and how to look for the classifier.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub model_dir: PathBuf,
    /// File names tried in order before the directory scan
    pub priority: Vec<String>,
    /// Extensions (without dot) accepted by the directory scan
    pub extensions: Vec<String>,
    /// Extensions whose files may hold weights for the reconstructed architecture
    pub weights_extensions: Vec<String>,
    /// Fixed output semantics; probed from the model when `None`
    pub semantics: Option<OutputSemantics>,
    /// Layer widths used by the weights fallback
    pub architecture: CnnBiLstmConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            priority: DEFAULT_PRIORITY.iter().map(|s| s.to_string()).collect(),
            extensions: vec!["onnx".into(), "safetensors".into()],
            weights_extensions: vec!["safetensors".into()],
            semantics: None,
            architecture: CnnBiLstmConfig::RECONSTRUCTED,
        }
    }
}

impl ResolverConfig {
    pub fn with_model_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Self::default()
        }
    }
}

/// Locates the classifier artifact and materializes it as a [`ModelHandle`].
pub struct ModelResolver {
    config: ResolverConfig,
    session_factory: SessionFactory,
}

impl ModelResolver {
    /// Resolver using default CPU ONNX Runtime sessions.
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            session_factory: Box::new(Session::builder),
        }
    }

    /// Replace the session builder factory, e.g. to register execution providers.
    pub fn with_session_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ort::Result<SessionBuilder> + Send + Sync + 'static,
    {
        self.session_factory = Box::new(factory);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Find the artifact to load without touching its contents.
    pub fn locate(&self) -> Result<PathBuf, ModelError> {
        let dir = &self.config.model_dir;

        if let Some(path) = self
            .config
            .priority
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
        {
            tracing::debug!(path = %path.display(), "model found by name");
            return Ok(path);
        }

        self.scan(dir)?.ok_or_else(|| ModelError::NotFound {
            dir: dir.clone(),
            candidates: self.config.priority.clone(),
        })
    }

    /// First file in sorted order with a recognized extension.
    fn scan(&self, dir: &Path) -> Result<Option<PathBuf>, ModelError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "model directory unreadable");
                return Ok(None);
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_extension(path, &self.config.extensions))
            .collect();
        files.sort();

        if let Some(path) = files.first() {
            tracing::debug!(path = %path.display(), "model found by extension");
        }

        Ok(files.into_iter().next())
    }

    /// Locate and load the classifier, falling back to the reconstructed
    /// architecture for weights-capable files.
    pub fn load(&self) -> Result<ModelHandle, ModelError> {
        let path = self.locate()?;
        let model_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::info!(path = %path.display(), "loading model");

        let direct = match self.load_direct(&path) {
            Ok((classifier, semantics)) => {
                tracing::info!(%model_file, %semantics, "model loaded");
                return Ok(ModelHandle::loaded(
                    classifier,
                    model_file,
                    LoadPath::Direct,
                    semantics,
                ));
            }
            Err(e) => e,
        };

        if !has_extension(&path, &self.config.weights_extensions) {
            return Err(ModelError::Load {
                path,
                direct: Box::new(direct),
                fallback: None,
            });
        }

        tracing::warn!(
            error = %direct,
            "full model load failed, loading weights into reconstructed architecture"
        );

        match self.load_reconstructed(&path) {
            Ok((classifier, semantics)) => {
                tracing::info!(%model_file, %semantics, "model loaded from weights");
                Ok(ModelHandle::loaded(
                    classifier,
                    model_file,
                    LoadPath::Reconstructed,
                    semantics,
                ))
            }
            Err(fallback) => Err(ModelError::Load {
                path,
                direct: Box::new(direct),
                fallback: Some(Box::new(fallback)),
            }),
        }
    }

    /// Deserialize the artifact as a complete model graph.
    fn load_direct(
        &self,
        path: &Path,
    ) -> Result<(Box<dyn Classifier>, OutputSemantics), Error> {
        if !has_extension(path, &["onnx"]) {
            return Err(ModelError::NoArchitecture {
                path: path.to_path_buf(),
            }
            .into());
        }

        let builder = (self.session_factory)().map_err(ModelError::from)?;
        let classifier = OnnxClassifier::from_file(path, builder)?;
        let semantics = match self.config.semantics {
            Some(semantics) => semantics,
            None => probe_semantics(&classifier)?,
        };

        Ok((Box::new(classifier), semantics))
    }

    /// Load named weights into the hard-coded architecture.
    ///
    /// Its head is a single sigmoid unit, so configured semantics do not apply.
    fn load_reconstructed(
        &self,
        path: &Path,
    ) -> Result<(Box<dyn Classifier>, OutputSemantics), Error> {
        let model = CnnBiLstm::from_safetensors(path, self.config.architecture)?;

        match self.config.semantics {
            Some(configured) if configured != OutputSemantics::Sigmoid => tracing::warn!(
                %configured,
                "ignoring configured output semantics for reconstructed sigmoid head"
            ),
            _ => {}
        }

        Ok((Box::new(model), OutputSemantics::Sigmoid))
    }
}

impl fmt::Debug for ModelResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed.as_ref()))
        })
}
