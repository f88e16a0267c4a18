//! Turning an upload or a URL into a local 16kHz mono WAV file.

use crate::error::{MediaError, Result};
use crate::fetch::Fetcher;
use crate::transcode::{Transcoder, is_wav};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name reported for uploads that arrive without a file name.
pub const DEFAULT_UPLOAD_NAME: &str = "uploaded_audio";

/// Where the media for one request comes from.
#[derive(Clone, Debug)]
pub enum MediaSource {
    /// Raw bytes with the client's file name, if any
    Upload {
        bytes: Vec<u8>,
        file_name: Option<String>,
    },
    /// Remote locator handed to the downloader
    Url(String),
}

impl MediaSource {
    pub fn upload(bytes: Vec<u8>, file_name: Option<String>) -> Self {
        MediaSource::Upload { bytes, file_name }
    }

    pub fn url(url: impl Into<String>) -> Self {
        MediaSource::Url(url.into())
    }

    /// Name to report for this source: the upload's file name or the URL.
    pub fn display_name(&self) -> String {
        match self {
            MediaSource::Upload { file_name, .. } => file_name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_UPLOAD_NAME)
                .to_string(),
            MediaSource::Url(url) => url.clone(),
        }
    }
}

/// A normalized WAV file and the scratch directory holding it.
///
/// Dropping this removes every file created for the request.
#[derive(Debug)]
pub struct NormalizedMedia {
    wav_path: PathBuf,
    converted: bool,
    scratch: TempDir,
}

impl NormalizedMedia {
    /// WAV file ready for decoding.
    pub fn wav_path(&self) -> &Path {
        &self.wav_path
    }

    /// Whether ffmpeg produced the WAV (false when the input was already WAV).
    pub fn converted(&self) -> bool {
        self.converted
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

/// Acquires media into a per-request scratch directory and converts it to WAV.
#[derive(Clone, Debug, Default)]
pub struct MediaNormalizer {
    pub transcoder: Transcoder,
    pub fetcher: Fetcher,
    /// Parent for scratch directories; the system temp dir when `None`
    pub scratch_root: Option<PathBuf>,
}

impl MediaNormalizer {
    /// Acquire `source` and return a WAV file on local disk.
    ///
    /// Inputs whose extension is already `.wav` are used as-is; everything
    /// else goes through the transcoder. The scratch directory is removed on
    /// every error path, and when the returned guard is dropped.
    pub async fn normalize(&self, source: &MediaSource) -> Result<NormalizedMedia> {
        let scratch = self.scratch_dir()?;

        let acquired = match source {
            MediaSource::Upload { bytes, file_name } => {
                write_upload(scratch.path(), bytes, file_name.as_deref()).await?
            }
            MediaSource::Url(url) => {
                let download_dir = scratch.path().join("download");
                tokio::fs::create_dir(&download_dir).await?;
                self.fetcher.fetch(url, &download_dir).await?
            }
        };

        if is_wav(&acquired) {
            tracing::debug!(path = %acquired.display(), "input already wav");
            return Ok(NormalizedMedia {
                wav_path: acquired,
                converted: false,
                scratch,
            });
        }

        let wav_path = scratch.path().join("converted.wav");
        self.transcoder.to_wav(&acquired, &wav_path).await?;

        Ok(NormalizedMedia {
            wav_path,
            converted: true,
            scratch,
        })
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("deepscan-");

        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        tracing::trace!(dir = %dir.path().display(), "scratch directory created");
        Ok(dir)
    }
}

/// Persist upload bytes as `input<.ext>`, keeping only the client's extension.
async fn write_upload(dir: &Path, bytes: &[u8], file_name: Option<&str>) -> Result<PathBuf> {
    if bytes.is_empty() {
        return Err(MediaError::Input("uploaded file is empty".to_string()));
    }

    let mut path = dir.join("input");
    if let Some(ext) = file_name.and_then(|name| Path::new(name).extension()) {
        path.set_extension(ext);
    }

    tokio::fs::write(&path, bytes).await?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "upload written");
    Ok(path)
}
