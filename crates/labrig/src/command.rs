//! One-shot shell command execution with timeouts.
//!
//! Terminal commands, validation steps, and namespace management all run
//! through [`CommandRunner`]: spawn `sh -c <command>`, capture both output
//! streams, and enforce a deadline. A command that outlives its deadline is
//! killed and reported as [`CommandError::TimedOut`] rather than an I/O
//! failure, because callers surface timeouts as ordinary command outcomes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors produced by [`CommandRunner::run`].
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command did not finish within the allotted time.
    #[error("Command timed out after {0} seconds")]
    TimedOut(u64),
    /// The command could not be spawned or awaited.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Captured outcome of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited cleanly.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execution parameters for a single command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl RunOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cwd: None,
            env: Vec::new(),
            timeout,
        }
    }

    /// Working directory for the child, inherited from the server when unset.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Extra environment variable, layered over the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Runs shell command strings as short-lived `sh -c` children.
#[derive(Debug, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `command` through the shell and wait for it to finish.
    ///
    /// Stdout and stderr are captured in full (lossy UTF-8). The child is
    /// killed if the timeout elapses first.
    pub async fn run(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        debug!(command, timeout_secs = options.timeout.as_secs(), "running shell command");

        let child = cmd.spawn()?;
        // Dropping the wait future on timeout drops the child handle, and
        // kill_on_drop takes the process down with it.
        let output = match tokio::time::timeout(options.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(CommandError::TimedOut(options.timeout.as_secs())),
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
