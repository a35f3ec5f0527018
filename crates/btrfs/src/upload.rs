//! Offsite upload through an external command

use crate::process::run_command;
use async_trait::async_trait;
use sbm_core::{BackupTarget, StorageError, StorageErrorKind, StorageOp};
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Placeholder replaced by the local file path.
pub const FILE_PLACEHOLDER: &str = "{file}";
/// Placeholder replaced by the remote identifier.
pub const REMOTE_PLACEHOLDER: &str = "{remote}";

/// Uploads by running a configured command line
///
/// The first element is the program; `{file}` and `{remote}` in any
/// argument are substituted per call. Re-running with the same remote
/// identifier overwrites, so retries are safe.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandUploader {
    pub fn new(command: Vec<String>, timeout: Duration) -> Result<Self, StorageError> {
        if command.is_empty() {
            return Err(StorageError::new(
                StorageOp::Upload,
                StorageErrorKind::CommandFailed,
                "upload command is empty",
            ));
        }
        Ok(Self { command, timeout })
    }

    /// Backblaze B2 CLI: `b2 upload-file <bucket> {file} {remote}`.
    pub fn b2(bucket: &str, timeout: Duration) -> Self {
        Self {
            command: vec![
                "b2".to_string(),
                "upload-file".to_string(),
                bucket.to_string(),
                FILE_PLACEHOLDER.to_string(),
                REMOTE_PLACEHOLDER.to_string(),
            ],
            timeout,
        }
    }

    fn args_for(&self, file: &Path, remote_id: &str) -> Vec<OsString> {
        self.command[1..]
            .iter()
            .map(|arg| {
                if arg == FILE_PLACEHOLDER {
                    file.as_os_str().to_os_string()
                } else {
                    OsString::from(
                        arg.replace(FILE_PLACEHOLDER, &file.to_string_lossy())
                            .replace(REMOTE_PLACEHOLDER, remote_id),
                    )
                }
            })
            .collect()
    }
}

#[async_trait]
impl BackupTarget for CommandUploader {
    async fn upload(&self, file: &Path, remote_id: &str) -> Result<(), StorageError> {
        info!(file = %file.display(), remote_id, "uploading");
        run_command(
            OsString::from(&self.command[0]).as_os_str(),
            self.args_for(file, remote_id),
            StorageOp::Upload,
            self.timeout,
        )
        .await
        .map(|_| ())
    }
}
