//! Error types for deepscan-media.

use std::path::PathBuf;
use thiserror::Error;

/// Media acquisition and normalization errors.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Transcoder exited with a failure status
    #[error("ffmpeg conversion failed: {stderr}")]
    Conversion { stderr: String },

    /// Transcoder exceeded its deadline and was killed
    #[error("ffmpeg conversion timed out after {secs}s")]
    ConversionTimeout { secs: u64 },

    /// External tool could not be started
    #[error("failed to run {tool}: {source}")]
    Spawn {
        stage: Stage,
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Downloader exited with a failure status
    #[error("yt-dlp failed: {stderr}")]
    Fetch { stderr: String },

    /// Downloader exceeded its deadline and was killed
    #[error("yt-dlp timed out after {secs}s")]
    FetchTimeout { secs: u64 },

    /// Download finished but left no recognizable audio file
    #[error("no audio file found after yt-dlp download in {}", dir.display())]
    NoAudioFound { dir: PathBuf },

    /// Caller supplied nothing to process
    #[error("invalid input: {0}")]
    Input(String),

    /// Scratch directory or file IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tool-driven step of normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Download,
    Conversion,
}

impl MediaError {
    /// Whether the failure lies with the request rather than the tools.
    pub fn is_input(&self) -> bool {
        matches!(self, MediaError::Input(_))
    }

    /// Whether the failure happened while fetching remote media.
    pub fn is_download(&self) -> bool {
        matches!(
            self,
            MediaError::Fetch { .. }
                | MediaError::FetchTimeout { .. }
                | MediaError::NoAudioFound { .. }
                | MediaError::Spawn {
                    stage: Stage::Download,
                    ..
                }
        )
    }
}

/// Result type alias for deepscan-media operations.
pub type Result<T> = std::result::Result<T, MediaError>;
