//! Session lifecycle policy.
//!
//! [`SessionManager`] sits between the HTTP handlers and the registry. It
//! owns id generation, workspace directory layout, and the rule that a
//! record leaves the registry before its process is touched, so concurrent
//! requests against a dying session observe a clean not-found instead of a
//! half-terminated shell.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::models::{InteractiveSession, SessionRecord, WorkspaceSession};
use crate::session::process::{PolledOutput, ProcessError, ProcessHandle};
use crate::session::registry::SessionRegistry;

/// Workspace session ids are a uuid truncated to this many characters.
const WORKSPACE_ID_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session '{0}' not found")]
    NotFound(String),
    #[error("Invalid session ID")]
    UnknownWorkspaceSession,
    #[error("session id collision for '{0}'")]
    IdCollision(String),
    #[error("session stdin is closed")]
    StdinClosed,
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Working directory and namespace resolved for a terminal command.
#[derive(Debug, Clone)]
pub struct TerminalContext {
    pub workspace: PathBuf,
    pub namespace: Option<String>,
}

pub struct SessionManager {
    registry: SessionRegistry,
    workspace_root: PathBuf,
    shell: String,
    output_buffer_lines: usize,
    terminate_grace: Duration,
}

impl SessionManager {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        shell: impl Into<String>,
        output_buffer_lines: usize,
        terminate_grace: Duration,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            workspace_root: workspace_root.into(),
            shell: shell.into(),
            output_buffer_lines,
            terminate_grace,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    /// Create an interactive shell session rooted in a fresh workspace
    /// directory under `<root>/<namespace>/<id>`. Returns the new id.
    pub async fn create_interactive(&self, namespace: &str) -> Result<String, SessionError> {
        let id = Uuid::new_v4().to_string();
        let workspace = self.workspace_root.join(namespace).join(&id);
        tokio::fs::create_dir_all(&workspace).await?;

        let process = ProcessHandle::spawn(&self.shell, &workspace, self.output_buffer_lines)?;
        let pid = process.pid();
        let record = SessionRecord::Interactive(InteractiveSession {
            id: id.clone(),
            namespace: namespace.to_string(),
            workspace,
            created_at: Utc::now(),
            process,
        });
        if self.registry.insert(record).await.is_err() {
            // Dropping the rejected record takes its shell down with it.
            return Err(SessionError::IdCollision(id));
        }

        info!(session_id = %id, pid, namespace, "created interactive session");
        Ok(id)
    }

    /// Remove an interactive session and stop its shell. The record leaves
    /// the registry before termination starts, so concurrent execute and
    /// read calls see not-found rather than a closing session. The
    /// workspace directory stays on disk.
    pub async fn delete_interactive(&self, id: &str) -> Result<(), SessionError> {
        let record = self
            .registry
            .remove(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        if let SessionRecord::Interactive(session) = record {
            session.process.terminate(self.terminate_grace).await?;
        }
        info!(session_id = %id, "deleted session");
        Ok(())
    }

    /// Confirm `id` names a live interactive session.
    pub async fn ensure_interactive(&self, id: &str) -> Result<(), SessionError> {
        let live = self
            .registry
            .with_record(id, |record| matches!(record, SessionRecord::Interactive(_)))
            .await
            .unwrap_or(false);
        if live {
            Ok(())
        } else {
            Err(SessionError::NotFound(id.to_string()))
        }
    }

    /// Queue one command line to the session's shell stdin.
    pub async fn execute_interactive(&self, id: &str, command: &str) -> Result<(), SessionError> {
        let sender = self
            .registry
            .with_record(id, |record| match record {
                SessionRecord::Interactive(session) => Some(session.process.stdin_sender()),
                SessionRecord::Workspace(_) => None,
            })
            .await
            .flatten()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        // The send happens after the registry lock is gone; a full queue
        // waits here without holding anything up.
        sender
            .send(command.to_string())
            .await
            .map_err(|_| SessionError::StdinClosed)?;
        debug!(session_id = %id, command, "queued command to session stdin");
        Ok(())
    }

    /// Pop at most one buffered line per output stream, without blocking.
    pub async fn read_output(&self, id: &str) -> Result<PolledOutput, SessionError> {
        let tap = self
            .registry
            .with_record(id, |record| match record {
                SessionRecord::Interactive(session) => Some(session.process.output_tap()),
                SessionRecord::Workspace(_) => None,
            })
            .await
            .flatten()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        Ok(tap.poll_lines().await)
    }

    /// Create a workspace session: an 8-character id, a directory directly
    /// under the workspace root, and no process.
    pub async fn create_workspace(
        &self,
        question_id: &str,
    ) -> Result<WorkspaceSession, SessionError> {
        let id = Uuid::new_v4().to_string()[..WORKSPACE_ID_LEN].to_string();
        let workspace = self.workspace_root.join(&id);
        tokio::fs::create_dir_all(&workspace).await?;

        let session = WorkspaceSession {
            id: id.clone(),
            question_id: question_id.to_string(),
            namespace: None,
            workspace,
            created_at: Utc::now(),
        };
        if self
            .registry
            .insert(SessionRecord::Workspace(session.clone()))
            .await
            .is_err()
        {
            return Err(SessionError::IdCollision(id));
        }

        info!(
            session_id = %session.id,
            question_id,
            workspace = %session.workspace.display(),
            "created workspace session"
        );
        Ok(session)
    }

    /// Remove a session record, keeping its workspace directory on disk.
    /// An interactive record ended through this path still gets its shell
    /// stopped; a failed stop is logged, not returned. The only error is
    /// an unknown id.
    pub async fn end_workspace(&self, id: &str) -> Result<(), SessionError> {
        let record = self
            .registry
            .remove(id)
            .await
            .ok_or(SessionError::UnknownWorkspaceSession)?;

        if let SessionRecord::Interactive(session) = record {
            if let Err(err) = session.process.terminate(self.terminate_grace).await {
                warn!(session_id = %id, %err, "failed to stop shell while ending session");
            }
        }
        info!(session_id = %id, "ended session, workspace kept");
        Ok(())
    }

    /// Resolve the working directory and namespace for a terminal command,
    /// when `id` names a known session. A namespace supplied with the
    /// request is stored on a workspace record that has none yet; later
    /// requests cannot change it.
    pub async fn terminal_context(
        &self,
        id: &str,
        requested_namespace: Option<&str>,
    ) -> Option<TerminalContext> {
        self.registry
            .with_record(id, |record| {
                if let SessionRecord::Workspace(session) = record {
                    if session.namespace.is_none() {
                        session.namespace = requested_namespace
                            .filter(|ns| !ns.is_empty())
                            .map(str::to_string);
                    }
                }
                TerminalContext {
                    workspace: record.workspace().to_path_buf(),
                    namespace: record.namespace().map(str::to_string),
                }
            })
            .await
    }

    /// Terminate every live interactive session. Called on server shutdown.
    pub async fn shutdown_all(&self) {
        let records = self.registry.take_all().await;
        for record in records {
            let id = record.id().to_string();
            if let SessionRecord::Interactive(session) = record {
                match session.process.terminate(self.terminate_grace).await {
                    Ok(()) => info!("Stopped session {id}"),
                    Err(err) => warn!("Failed to stop session {id}: {err}"),
                }
            }
        }
    }
}
