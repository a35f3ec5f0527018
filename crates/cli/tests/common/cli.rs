//! Helpers for running the `sbm` binary against a scratch host

use super::TestHost;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

/// `sbm` invocation pinned to a test host's directories
pub struct SbmCommand {
    binary_path: PathBuf,
    base_args: Vec<String>,
    args: Vec<String>,
}

impl SbmCommand {
    pub fn new(host: &TestHost) -> Self {
        Self {
            binary_path: PathBuf::from(env!("CARGO_BIN_EXE_sbm")),
            base_args: vec![
                "--sysconfig-dir".to_string(),
                host.sysconfig_dir.display().to_string(),
                "--lock-dir".to_string(),
                host.lock_dir.display().to_string(),
            ],
            args: Vec::new(),
        }
    }

    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn execute(&self) -> Result<CommandResult> {
        let start = Instant::now();
        let output = Command::new(&self.binary_path)
            .args(&self.base_args)
            .args(&self.args)
            .env("NO_COLOR", "1")
            .output()
            .context("Failed to execute sbm")?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }

    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;
        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }
        Ok(result)
    }

    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;
        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    #[allow(dead_code)]
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }
}

/// Usage: `sbm!(host, "config", "list").assert_success()?;`
#[macro_export]
macro_rules! sbm {
    ($host:expr, $($arg:expr),*) => {{
        let mut cmd = $crate::common::cli::SbmCommand::new($host);
        cmd.args(&[$($arg),*]);
        cmd
    }};
}
