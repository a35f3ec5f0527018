//! Process lock so only one invocation touches the config store at a time

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "btrfs-sbm.lock";

/// Held for the lifetime of one invocation
pub struct InvocationLock {
    path: PathBuf,
    file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: String,
}

impl InvocationLock {
    /// Acquire the exclusive lock in `lock_dir` without blocking.
    ///
    /// Fails if another live process holds it.
    pub fn acquire(lock_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(lock_dir)
            .with_context(|| format!("Failed to create lock directory {}", lock_dir.display()))?;
        let lock_path = lock_dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        if !try_flock_exclusive(&file)? {
            let holder = read_lock_content(&mut file)
                .map(|c| format!(" (pid {}, started {})", c.pid, c.started_at))
                .unwrap_or_default();
            anyhow::bail!(
                "Another btrfs-sbm invocation is running{}; lock file {}",
                holder,
                lock_path.display()
            );
        }

        write_lock_content(&mut file)?;
        tracing::debug!(path = %lock_path.display(), "acquired invocation lock");

        Ok(Self {
            path: lock_path,
            file,
        })
    }
}

impl Drop for InvocationLock {
    fn drop(&mut self) {
        // Truncate rather than unlink: removing the path would let a waiting
        // process lock a fresh inode while this one is still held.
        let _ = self.file.set_len(0);
        tracing::debug!(path = %self.path.display(), "released invocation lock");
    }
}

fn write_lock_content(file: &mut File) -> Result<()> {
    let content = LockContent {
        pid: std::process::id(),
        started_at: chrono::Local::now().to_rfc3339(),
    };
    let serialized = serde_json::to_string(&content).context("Failed to serialize lock content")?;

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(serialized.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn read_lock_content(file: &mut File) -> Result<LockContent> {
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).context("Failed to deserialize lock content")
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();

        let first = InvocationLock::acquire(dir.path()).unwrap();
        let err = InvocationLock::acquire(dir.path()).err().unwrap();
        assert!(err.to_string().contains("Another btrfs-sbm invocation"));
        assert!(err.to_string().contains(&std::process::id().to_string()));

        drop(first);
        assert!(InvocationLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_lock_records_pid() {
        let dir = TempDir::new().unwrap();
        let mut lock = InvocationLock::acquire(dir.path()).unwrap();

        let content = read_lock_content(&mut lock.file).unwrap();
        assert_eq!(content.pid, std::process::id());
        assert!(!content.started_at.is_empty());
    }

    #[test]
    fn test_creates_lock_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("run/sbm");
        let _lock = InvocationLock::acquire(&nested).unwrap();
        assert!(nested.join(LOCK_FILE).exists());
    }
}
