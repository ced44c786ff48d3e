//! Session management: registry, process plumbing, lifecycle policy.

pub mod models;
pub mod process;
pub mod registry;
pub mod service;

pub use models::{InteractiveSession, SessionRecord, WorkspaceSession};
pub use process::{OutputTap, PolledOutput, ProcessError, ProcessHandle};
pub use registry::SessionRegistry;
pub use service::{SessionError, SessionManager, TerminalContext};
