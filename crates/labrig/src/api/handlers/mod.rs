//! Request handlers.

pub mod cluster;
pub mod misc;
pub mod sessions;
pub mod terminal;
pub mod validation;
