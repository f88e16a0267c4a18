//! Spectrogram persistence under the static-serving directory.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Static-serving root used when none is configured.
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Subdirectory of the static root holding spectrogram images.
pub const SPECTROGRAM_SUBDIR: &str = "spectrograms";

/// URL prefix under which stored spectrograms are served.
pub const PUBLIC_PREFIX: &str = "/static/spectrograms";

/// A spectrogram written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSpectrogram {
    pub path: PathBuf,
    pub public_path: String,
}

/// Writes spectrogram PNGs as `spect_<unix>_<hex6>.png`.
#[derive(Clone, Debug)]
pub struct SpectrogramStore {
    dir: PathBuf,
}

impl Default for SpectrogramStore {
    fn default() -> Self {
        Self::in_static_dir(DEFAULT_STATIC_DIR)
    }
}

impl SpectrogramStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `<static_dir>/spectrograms`.
    pub fn in_static_dir(static_dir: impl AsRef<Path>) -> Self {
        Self::new(static_dir.as_ref().join(SPECTROGRAM_SUBDIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `png` under a fresh name, creating the directory if needed.
    pub async fn save(&self, png: &[u8]) -> io::Result<StoredSpectrogram> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = file_name();
        let path = self.dir.join(&name);
        tokio::fs::write(&path, png).await?;

        tracing::debug!(path = %path.display(), bytes = png.len(), "spectrogram saved");

        Ok(StoredSpectrogram {
            path,
            public_path: format!("{PUBLIC_PREFIX}/{name}"),
        })
    }

    /// Remove a spectrogram that will not be reported.
    pub async fn discard(&self, stored: &StoredSpectrogram) {
        if let Err(e) = tokio::fs::remove_file(&stored.path).await {
            tracing::warn!(
                path = %stored.path.display(),
                error = %e,
                "failed to remove spectrogram"
            );
        }
    }
}

/// `spect_<unix seconds>_<6 random hex digits>.png`
fn file_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let hex = Uuid::new_v4().simple().to_string();

    format!("spect_{secs}_{}.png", &hex[..6])
}
