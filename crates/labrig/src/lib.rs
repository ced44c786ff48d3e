//! Labrig backend: sessions and command execution for a hands-on training
//! platform.
//!
//! Learners work through labs and questions in the browser; this service
//! gives each of them a workspace directory on the server, runs their
//! commands (either streamed into a long-lived interactive shell or as
//! one-shot terminal invocations), and checks their progress by executing
//! per-step validation commands. Everything is exposed as a JSON HTTP API
//! under `/api`.

pub mod api;
pub mod command;
pub mod session;
pub mod validation;
