//! ffmpeg transcoding to 16kHz mono WAV.

use crate::error::{MediaError, Result, Stage};
use crate::tool::{ToolFailure, run_tool};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sample rate of transcoded output.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Deadline for one transcode.
pub const DEFAULT_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(120);

/// Whether `path` already names a WAV file (extension check, case-insensitive).
pub fn is_wav(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

/// ffmpeg invocation settings.
#[derive(Clone, Debug)]
pub struct Transcoder {
    pub program: PathBuf,
    pub timeout: Duration,
    pub sample_rate: u32,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout: DEFAULT_TRANSCODE_TIMEOUT,
            sample_rate: TARGET_SAMPLE_RATE,
        }
    }
}

impl Transcoder {
    /// `-y -i <input> -ar <rate> -ac 1 <output>`
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-ar".into(),
            self.sample_rate.to_string().into(),
            "-ac".into(),
            "1".into(),
            output.into(),
        ]
    }

    /// Convert `input` into a mono WAV at `output`.
    ///
    /// Any partial output is removed when the conversion fails.
    pub async fn to_wav(&self, input: &Path, output: &Path) -> Result<()> {
        tracing::info!(input = %input.display(), "converting to wav");

        let result = run_tool(
            self.program.as_os_str(),
            &self.args(input, output),
            self.timeout,
        )
        .await;

        let error = match result {
            Ok(_) => return Ok(()),
            Err(ToolFailure::Spawn(source)) => MediaError::Spawn {
                stage: Stage::Conversion,
                tool: self.program.display().to_string(),
                source,
            },
            Err(ToolFailure::Wait(e)) => MediaError::Io(e),
            Err(ToolFailure::Status(stderr)) => MediaError::Conversion { stderr },
            Err(ToolFailure::Timeout) => MediaError::ConversionTimeout {
                secs: self.timeout.as_secs(),
            },
        };

        match tokio::fs::remove_file(output).await {
            Ok(()) => tracing::debug!(path = %output.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %output.display(), error = %e, "failed to remove partial output")
            }
        }

        Err(error)
    }
}
