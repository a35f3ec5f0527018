//! Snapshot storage backed by the `btrfs` command line tool

use crate::process::run_command;
use async_trait::async_trait;
use sbm_core::{SnapshotStorage, StorageError, StorageErrorKind, StorageOp};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// `btrfs-progs` wrapper
///
/// Every call is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct BtrfsCli {
    program: PathBuf,
    timeout: Duration,
}

impl BtrfsCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("btrfs"),
            timeout,
        }
    }

    /// Use a different executable, e.g. an absolute path to `btrfs`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    async fn btrfs(&self, op: StorageOp, args: Vec<OsString>) -> Result<(), StorageError> {
        run_command(self.program.as_os_str(), args, op, self.timeout)
            .await
            .map(|_| ())
    }
}

fn os(s: &str) -> OsString {
    OsString::from(s)
}

fn p(path: &Path) -> OsString {
    path.as_os_str().to_os_string()
}

#[async_trait]
impl SnapshotStorage for BtrfsCli {
    async fn create(&self, source: &Path, destination: &Path) -> Result<(), StorageError> {
        info!(source = %source.display(), destination = %destination.display(), "taking read-only snapshot");
        self.btrfs(
            StorageOp::Create,
            vec![os("subvolume"), os("snapshot"), os("-r"), p(source), p(destination)],
        )
        .await
    }

    async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        info!(path = %path.display(), "deleting subvolume");
        self.btrfs(StorageOp::Delete, vec![os("subvolume"), os("delete"), p(path)])
            .await
    }

    async fn diff(
        &self,
        parent: Option<&Path>,
        snapshot: &Path,
        output: &Path,
    ) -> Result<(), StorageError> {
        let mut args = vec![os("send")];
        if let Some(parent) = parent {
            args.push(os("-p"));
            args.push(p(parent));
        }
        args.extend([os("-f"), p(output), p(snapshot)]);

        info!(
            parent = ?parent.map(|p| p.display().to_string()),
            snapshot = %snapshot.display(),
            output = %output.display(),
            "sending snapshot stream"
        );
        self.btrfs(StorageOp::Diff, args).await
    }

    async fn create_subvolume(&self, path: &Path) -> Result<(), StorageError> {
        info!(path = %path.display(), "creating subvolume");
        self.btrfs(StorageOp::CreateSubvolume, vec![os("subvolume"), os("create"), p(path)])
            .await
    }

    async fn subvolume_exists(&self, path: &Path) -> Result<bool, StorageError> {
        match self
            .btrfs(StorageOp::Inspect, vec![os("subvolume"), os("show"), p(path)])
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.kind, StorageErrorKind::NotFound | StorageErrorKind::CommandFailed) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
