//! Test utilities and common setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use labrig::api::{self, AppState};
use labrig::command::CommandRunner;
use labrig::session::SessionManager;
use labrig::validation::ValidationEngine;
use tempfile::TempDir;

/// A test application together with the directories it serves from.
///
/// The temp dir is held so workspace and content paths stay alive for the
/// duration of each test.
pub struct TestEnv {
    pub app: Router,
    pub workspace_root: PathBuf,
    pub labs_dir: PathBuf,
    pub questions_dir: PathBuf,
    _root: TempDir,
}

/// Create a test application with all services initialized.
///
/// Sessions use `sh` with a small output buffer, terminal commands get a
/// short timeout so timeout tests stay fast, and the cluster CLI is stubbed
/// with `echo` so namespace calls never touch a real cluster.
pub fn test_env() -> TestEnv {
    let root = TempDir::new().expect("create test dir");
    let workspace_root = root.path().join("workspaces");
    let labs_dir = root.path().join("labs");
    let questions_dir = root.path().join("questions");
    std::fs::create_dir_all(&workspace_root).expect("create workspace root");
    std::fs::create_dir_all(&labs_dir).expect("create labs dir");
    std::fs::create_dir_all(&questions_dir).expect("create questions dir");

    let sessions = Arc::new(SessionManager::new(
        workspace_root.clone(),
        "sh",
        100,
        Duration::from_secs(5),
    ));
    let runner = Arc::new(CommandRunner::new());
    let validator = Arc::new(ValidationEngine::new(
        labs_dir.clone(),
        questions_dir.clone(),
        Arc::clone(&runner),
        Duration::from_secs(5),
    ));
    let state = AppState::new(sessions, runner, validator)
        .with_terminal_timeout(Duration::from_secs(2))
        .with_cluster_cli("echo");

    let app = Router::new().nest("/api", api::create_router(state));

    TestEnv {
        app,
        workspace_root,
        labs_dir,
        questions_dir,
        _root: root,
    }
}

/// Write a validation step file into a content directory, creating the
/// directory first.
pub fn write_validation_file(dir: &Path, name: &str, body: &str) {
    std::fs::create_dir_all(dir).expect("create content dir");
    std::fs::write(dir.join(name), body).expect("write validation file");
}
