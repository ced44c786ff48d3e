//! Session record types.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::session::process::ProcessHandle;

/// A live interactive shell session.
#[derive(Debug)]
pub struct InteractiveSession {
    pub id: String,
    pub namespace: String,
    pub workspace: PathBuf,
    pub created_at: DateTime<Utc>,
    pub process: ProcessHandle,
}

/// A workspace-backed session for one-shot terminal commands. The namespace
/// starts unset and is filled in by the first terminal request that carries
/// one.
#[derive(Debug, Clone)]
pub struct WorkspaceSession {
    pub id: String,
    pub question_id: String,
    pub namespace: Option<String>,
    pub workspace: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Any session known to the registry.
#[derive(Debug)]
pub enum SessionRecord {
    Interactive(InteractiveSession),
    Workspace(WorkspaceSession),
}

impl SessionRecord {
    pub fn id(&self) -> &str {
        match self {
            Self::Interactive(session) => &session.id,
            Self::Workspace(session) => &session.id,
        }
    }

    pub fn workspace(&self) -> &Path {
        match self {
            Self::Interactive(session) => &session.workspace,
            Self::Workspace(session) => &session.workspace,
        }
    }

    /// Namespace associated with the session, however it got there.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Interactive(session) => Some(session.namespace.as_str()),
            Self::Workspace(session) => session.namespace.as_deref(),
        }
    }
}
