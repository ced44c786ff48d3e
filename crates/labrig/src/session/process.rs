//! Interactive shell process plumbing.
//!
//! Each interactive session owns one long-lived shell child. Commands are
//! queued to a writer task that owns the child's stdin, and a reader task per
//! output stream drains complete lines into a bounded buffer. Callers poll
//! those buffers without ever touching the pipes, so a silent shell can never
//! stall a request.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Queued stdin lines waiting for the writer task.
const STDIN_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{shell}': {source}")]
    Spawn {
        shell: String,
        source: std::io::Error,
    },
    #[error("child has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("failed to signal process {pid}: {errno}")]
    Signal { pid: u32, errno: nix::errno::Errno },
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Bounded line buffer filled by a reader task. When full, the oldest line
/// is dropped so a chatty shell overwrites history instead of growing
/// without bound.
#[derive(Debug)]
struct OutputBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn pop(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// One polled round of session output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Cheap handle for polling buffered output outside any registry lock.
#[derive(Clone)]
pub struct OutputTap {
    stdout: Arc<Mutex<OutputBuffer>>,
    stderr: Arc<Mutex<OutputBuffer>>,
}

impl OutputTap {
    /// Pop at most one buffered line from each stream, without waiting.
    /// Streams with nothing buffered yield empty strings.
    pub async fn poll_lines(&self) -> PolledOutput {
        let stdout = self.stdout.lock().await.pop().unwrap_or_default();
        let stderr = self.stderr.lock().await.pop().unwrap_or_default();
        PolledOutput { stdout, stderr }
    }
}

/// A spawned interactive shell and its I/O tasks.
pub struct ProcessHandle {
    pid: u32,
    child: Child,
    stdin_tx: mpsc::Sender<String>,
    stdout_buf: Arc<Mutex<OutputBuffer>>,
    stderr_buf: Arc<Mutex<OutputBuffer>>,
    _writer_task: JoinHandle<()>,
    _stdout_task: JoinHandle<()>,
    _stderr_task: JoinHandle<()>,
}

impl ProcessHandle {
    /// Spawn `shell` in `cwd` with all three stdio streams piped and start
    /// the writer and reader tasks.
    pub fn spawn(shell: &str, cwd: &Path, buffer_lines: usize) -> Result<Self, ProcessError> {
        let mut child = Command::new(shell)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                shell: shell.to_string(),
                source,
            })?;

        let pid = child.id().unwrap_or(0);
        let mut stdin = child
            .stdin
            .take()
            .ok_or(ProcessError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::MissingPipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::MissingPipe("stderr"))?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(STDIN_QUEUE_DEPTH);
        let writer_task = tokio::spawn(async move {
            while let Some(line) = stdin_rx.recv().await {
                if let Err(err) = stdin.write_all(line.as_bytes()).await {
                    warn!(pid, %err, "failed to write to shell stdin");
                    break;
                }
                if let Err(err) = stdin.write_all(b"\n").await {
                    warn!(pid, %err, "failed to write to shell stdin");
                    break;
                }
                if let Err(err) = stdin.flush().await {
                    warn!(pid, %err, "failed to flush shell stdin");
                    break;
                }
            }
            // Dropping stdin here sends EOF to the shell.
            debug!(pid, "stdin writer finished");
        });

        let stdout_buf = Arc::new(Mutex::new(OutputBuffer::new(buffer_lines)));
        let stderr_buf = Arc::new(Mutex::new(OutputBuffer::new(buffer_lines)));
        let stdout_task = tokio::spawn(drain_lines(stdout, Arc::clone(&stdout_buf), pid, "stdout"));
        let stderr_task = tokio::spawn(drain_lines(stderr, Arc::clone(&stderr_buf), pid, "stderr"));

        debug!(pid, shell, cwd = %cwd.display(), "spawned interactive shell");

        Ok(Self {
            pid,
            child,
            stdin_tx,
            stdout_buf,
            stderr_buf,
            _writer_task: writer_task,
            _stdout_task: stdout_task,
            _stderr_task: stderr_task,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Sender feeding the stdin writer task. Clone it out of the registry
    /// lock and send after release; a send fails only when the writer task
    /// has stopped.
    pub fn stdin_sender(&self) -> mpsc::Sender<String> {
        self.stdin_tx.clone()
    }

    /// Handle for polling buffered output outside the registry lock.
    pub fn output_tap(&self) -> OutputTap {
        OutputTap {
            stdout: Arc::clone(&self.stdout_buf),
            stderr: Arc::clone(&self.stderr_buf),
        }
    }

    /// Stop the child: close stdin, send SIGTERM, wait for the grace
    /// period, then SIGKILL if it is still alive.
    pub async fn terminate(mut self, grace: Duration) -> Result<(), ProcessError> {
        drop(self.stdin_tx);

        match signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            Ok(()) => {}
            Err(nix::errno::Errno::ESRCH) => {
                debug!(pid = self.pid, "process already gone before SIGTERM");
            }
            Err(errno) => {
                return Err(ProcessError::Signal {
                    pid: self.pid,
                    errno,
                });
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(pid = self.pid, %status, "shell exited after SIGTERM");
            }
            Err(_) => {
                warn!(
                    pid = self.pid,
                    grace_secs = grace.as_secs(),
                    "shell ignored SIGTERM, killing"
                );
                if let Err(err) = self.child.kill().await {
                    // The child may have exited in the window between the
                    // timeout and the kill.
                    if matches!(self.child.try_wait(), Ok(None)) {
                        return Err(ProcessError::Io(err));
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Reader task body: push complete lines into `buffer` until the pipe
/// closes.
async fn drain_lines<R>(
    pipe: R,
    buffer: Arc<Mutex<OutputBuffer>>,
    pid: u32,
    stream: &'static str,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => buffer.lock().await.push(line),
            Ok(None) => break,
            Err(err) => {
                warn!(pid, stream, %err, "error reading shell output");
                break;
            }
        }
    }
    debug!(pid, stream, "shell output stream closed");
}
