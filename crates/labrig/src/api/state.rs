//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use crate::command::CommandRunner;
use crate::session::SessionManager;
use crate::validation::ValidationEngine;

/// Everything the handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub runner: Arc<CommandRunner>,
    pub validator: Arc<ValidationEngine>,
    pub terminal_timeout: Duration,
    pub cluster_cli: String,
    pub cors_allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionManager>,
        runner: Arc<CommandRunner>,
        validator: Arc<ValidationEngine>,
    ) -> Self {
        Self {
            sessions,
            runner,
            validator,
            terminal_timeout: Duration::from_secs(30),
            cluster_cli: "oc".to_string(),
            cors_allowed_origins: Vec::new(),
        }
    }

    pub fn with_terminal_timeout(mut self, timeout: Duration) -> Self {
        self.terminal_timeout = timeout;
        self
    }

    pub fn with_cluster_cli(mut self, cli: impl Into<String>) -> Self {
        self.cluster_cli = cli.into();
        self
    }

    pub fn with_cors_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_allowed_origins = origins;
        self
    }
}
