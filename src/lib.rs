//! boltd - container lifecycle daemon
//!
//! This crate exposes the daemon's pieces for embedding and testing: the container
//! capability and its process-backed implementation, the lifecycle actions, the
//! asynchronous operation manager, the host probes and the REST API built on top of them.

pub mod api;
pub mod config;
pub mod container;
pub mod daemon;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod operation;
pub mod probe;

pub use error::{BoltdError, Result};

// Re-export anyhow for task authors
pub use anyhow;
