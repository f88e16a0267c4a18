//! Remote media download with yt-dlp.

use crate::error::{MediaError, Result, Stage};
use crate::tool::{ToolFailure, run_tool};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deadline for one download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(180);

/// Extensions accepted as downloaded audio (lower-case, without dot).
pub const AUDIO_EXTENSIONS: [&str; 6] = ["wav", "mp3", "m4a", "webm", "aac", "ogg"];

/// Name produced by the default template; only used when nothing else matches.
const FALLBACK_FILE: &str = "audio.wav";

/// yt-dlp invocation settings.
#[derive(Clone, Debug)]
pub struct Fetcher {
    pub program: PathBuf,
    pub timeout: Duration,
    /// Preferred codec for `--audio-format`
    pub audio_format: String,
    /// Output template relative to the download directory
    pub output_template: String,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            timeout: DEFAULT_FETCH_TIMEOUT,
            audio_format: "wav".to_string(),
            output_template: "audio.%(ext)s".to_string(),
        }
    }
}

impl Fetcher {
    /// `-x --audio-format <fmt> -o <dir>/<template> <url>`
    pub fn args(&self, url: &str, dir: &Path) -> Vec<OsString> {
        vec![
            "-x".into(),
            "--audio-format".into(),
            self.audio_format.as_str().into(),
            "-o".into(),
            dir.join(&self.output_template).into(),
            url.into(),
        ]
    }

    /// Download best-effort audio for `url` into `dir` and return the file.
    pub async fn fetch(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let url = url.trim();
        if url.is_empty() {
            return Err(MediaError::Input("no URL provided".to_string()));
        }

        tracing::info!(%url, "downloading media");

        run_tool(self.program.as_os_str(), &self.args(url, dir), self.timeout)
            .await
            .map_err(|failure| match failure {
                ToolFailure::Spawn(source) => MediaError::Spawn {
                    stage: Stage::Download,
                    tool: self.program.display().to_string(),
                    source,
                },
                ToolFailure::Wait(e) => MediaError::Io(e),
                ToolFailure::Status(stderr) => MediaError::Fetch { stderr },
                ToolFailure::Timeout => MediaError::FetchTimeout {
                    secs: self.timeout.as_secs(),
                },
            })?;

        let path = find_audio(dir)?;
        tracing::debug!(path = %path.display(), "downloaded audio");
        Ok(path)
    }
}

/// Pick the downloaded audio file in `dir`.
///
/// Entries other than `audio.wav` are scanned in name order and the first
/// with an audio extension wins; `audio.wav` is the last resort.
pub fn find_audio(dir: &Path) -> Result<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let fallback = dir.join(FALLBACK_FILE);
    let found = entries.into_iter().find(|path| {
        *path != fallback
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    AUDIO_EXTENSIONS
                        .iter()
                        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
                })
    });

    if let Some(path) = found {
        return Ok(path);
    }

    if fallback.is_file() {
        return Ok(fallback);
    }

    Err(MediaError::NoAudioFound {
        dir: dir.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[cfg(unix)]
    #[test]
    fn args_use_output_template_inside_dir() {
        let args = Fetcher::default().args("https://example.com/v", Path::new("/tmp/dl"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(
            args,
            [
                "-x",
                "--audio-format",
                "wav",
                "-o",
                "/tmp/dl/audio.%(ext)s",
                "https://example.com/v"
            ]
        );
    }

    #[test]
    fn find_audio_prefers_sorted_first_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("audio.info.json"), b"{}").unwrap();
        fs::write(dir.path().join("b.webm"), b"x").unwrap();
        fs::write(dir.path().join("a.M4A"), b"x").unwrap();

        let path = find_audio(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "a.M4A");
    }

    #[test]
    fn find_audio_uses_template_output_last() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("audio.wav"), b"x").unwrap();
        fs::write(dir.path().join("song.mp3"), b"x").unwrap();

        let path = find_audio(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "song.mp3");

        fs::remove_file(dir.path().join("song.mp3")).unwrap();
        let path = find_audio(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "audio.wav");
    }

    #[test]
    fn find_audio_ignores_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("audio.part"), b"x").unwrap();
        fs::write(dir.path().join("thumbnail.jpg"), b"x").unwrap();

        let err = find_audio(dir.path()).unwrap_err();
        assert!(matches!(err, MediaError::NoAudioFound { .. }));
    }

    #[tokio::test]
    async fn empty_url_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Fetcher::default().fetch("   ", dir.path()).await.unwrap_err();
        assert!(err.is_input());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn downloader_failure_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher {
            program: PathBuf::from("false"),
            ..Fetcher::default()
        };

        let err = fetcher
            .fetch("https://example.com/v", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Fetch { .. }));
        assert!(err.is_download());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_success_without_file_is_no_audio() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher {
            program: PathBuf::from("true"),
            ..Fetcher::default()
        };

        let err = fetcher
            .fetch("https://example.com/v", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NoAudioFound { .. }));
    }

    #[tokio::test]
    #[ignore = "network I/O"]
    async fn downloads_public_video_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = Fetcher::default()
            .fetch("https://www.youtube.com/watch?v=jNQXAC9IVRw", dir.path())
            .await
            .unwrap();
        assert!(path.exists());
    }
}
