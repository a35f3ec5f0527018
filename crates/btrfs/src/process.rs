//! Bounded execution of external tools

use sbm_core::{StorageError, StorageErrorKind, StorageOp};
use std::ffi::OsStr;
use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Run `program args...`, failing with [`StorageErrorKind::Timeout`] if it
/// does not exit within `timeout`. The child is killed on expiry.
pub async fn run_command<I, S>(
    program: &OsStr,
    args: I,
    op: StorageOp,
    timeout: Duration,
) -> Result<Output, StorageError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(?command, %op, "running external command");

    let child = command.spawn().map_err(|e| spawn_error(op, program, e))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(StorageError::new(op, StorageErrorKind::Io, e.to_string())),
        Err(_) => {
            return Err(StorageError::new(
                op,
                StorageErrorKind::Timeout,
                format!("{} did not finish within {:?}", program.to_string_lossy(), timeout),
            ))
        }
    };

    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.trim().is_empty() {
            format!("{} exited with {}", program.to_string_lossy(), output.status)
        } else {
            stderr.trim().to_string()
        };
        Err(StorageError::new(op, classify_stderr(&stderr), message))
    }
}

/// A missing binary is [`StorageErrorKind::Io`]; `NotFound` is reserved for
/// a missing target.
fn spawn_error(op: StorageOp, program: &OsStr, err: io::Error) -> StorageError {
    let program = program.to_string_lossy();
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::new(
            op,
            StorageErrorKind::Io,
            format!("failed to start {}: not installed or not on PATH", program),
        ),
        io::ErrorKind::PermissionDenied => StorageError::new(
            op,
            StorageErrorKind::PermissionDenied,
            format!("failed to start {}: {}", program, err),
        ),
        _ => StorageError::new(
            op,
            StorageErrorKind::Io,
            format!("failed to start {}: {}", program, err),
        ),
    }
}

/// Map a tool's stderr to a failure kind.
pub fn classify_stderr(stderr: &str) -> StorageErrorKind {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("no space left") || lower.contains("quota exceeded") {
        StorageErrorKind::NoSpace
    } else if lower.contains("permission denied") || lower.contains("operation not permitted") {
        StorageErrorKind::PermissionDenied
    } else if lower.contains("busy") {
        StorageErrorKind::Busy
    } else if lower.contains("no such file")
        || lower.contains("not found")
        || lower.contains("does not exist")
        || lower.contains("not a btrfs subvolume")
    {
        StorageErrorKind::NotFound
    } else {
        StorageErrorKind::CommandFailed
    }
}
