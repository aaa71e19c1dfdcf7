//! Container capability: the narrow interface the lifecycle core drives.
//!
//! The core never owns a container's run state. It reads it through
//! [`Container::render_state`] and changes it only through the other capability calls.
//!
//! ```text
//!            start                freeze
//!  Stopped ─────────▶ Running ─────────▶ Frozen
//!     ▲                 │    ◀─────────    │
//!     │  stop/shutdown  │     unfreeze     │
//!     └─────────────────┴──────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LifecycleError;

pub mod process;
pub mod registry;

pub use process::ProcessContainer;
pub use registry::ContainerRegistry;

/// Observable run state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    Stopped,
    Running,
    Frozen,
}

impl ContainerStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Stopped => 102,
            Self::Running => 103,
            Self::Frozen => 110,
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
            Self::Frozen => write!(f, "Frozen"),
        }
    }
}

/// Point-in-time snapshot returned by [`Container::render_state`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub status: ContainerStatus,
    pub status_code: u16,
    pub pid: Option<u32>,
}

impl ContainerState {
    pub fn new(status: ContainerStatus, pid: Option<u32>) -> Self {
        Self {
            status,
            status_code: status.code(),
            pid,
        }
    }
}

#[async_trait]
pub trait Container: Send + Sync {
    fn name(&self) -> &str;

    /// Stopped → Running.
    async fn start(&self) -> Result<(), LifecycleError>;

    /// Immediate forced stop, no grace period.
    async fn stop(&self) -> Result<(), LifecycleError>;

    /// Graceful stop. Waits up to `timeout`, or without bound when `None`.
    /// An expired deadline yields [`LifecycleError::ShutdownTimeout`].
    async fn shutdown(&self, timeout: Option<Duration>) -> Result<(), LifecycleError>;

    /// Running → Frozen.
    async fn freeze(&self) -> Result<(), LifecycleError>;

    /// Frozen → Running.
    async fn unfreeze(&self) -> Result<(), LifecycleError>;

    /// Snapshot read. Never changes the container.
    async fn render_state(&self) -> Result<ContainerState, LifecycleError>;
}

/// Resolves container names to capabilities.
#[async_trait]
pub trait ContainerLoader: Send + Sync {
    async fn load(&self, name: &str) -> Result<Arc<dyn Container>, LifecycleError>;
}
