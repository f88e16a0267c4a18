//! Bounded execution of external command-line tools.

use std::ffi::{OsStr, OsString};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Why a tool run did not succeed.
#[derive(Debug)]
pub(crate) enum ToolFailure {
    /// Program missing or not executable
    Spawn(std::io::Error),
    /// Waiting on the child failed after it started
    Wait(std::io::Error),
    /// Non-zero exit; carries trimmed stderr
    Status(String),
    /// Deadline passed; the child and its process group have been killed
    Timeout,
}

/// Run `program` with `args`, capturing stderr, killing it after `limit`.
///
/// Stdin is closed and stdout discarded. On success returns trimmed stderr.
/// On unix the child leads its own process group, so a timeout also takes
/// down helpers it spawned (yt-dlp runs ffmpeg, for one).
pub(crate) async fn run_tool(
    program: &OsStr,
    args: &[OsString],
    limit: Duration,
) -> Result<String, ToolFailure> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    tracing::debug!(?command, timeout_secs = limit.as_secs(), "running tool");

    let child = command.spawn().map_err(ToolFailure::Spawn)?;
    let pid = child.id();

    // Dropping the wait future on timeout drops the child, which kills it
    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => output.map_err(ToolFailure::Wait)?,
        Err(_) => {
            kill_group(pid);
            tracing::warn!(program = ?program, "tool timed out, killed");
            return Err(ToolFailure::Timeout);
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        Ok(stderr)
    } else {
        tracing::debug!(status = %output.status, %stderr, "tool failed");
        Err(ToolFailure::Status(stderr))
    }
}

/// SIGKILL every process left in the group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };

    // SAFETY: killpg only takes integer arguments
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let error = std::io::Error::last_os_error();
        // ESRCH: the group is already gone
        if error.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, %error, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
