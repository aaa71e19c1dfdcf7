use std::sync::Arc;
use tracing::info;

use crate::config::DaemonConfig;
use crate::container::{ContainerLoader, ContainerRegistry};
use crate::error::Result;
use crate::operation::OperationManager;
use crate::probe::HostCapabilities;

/// Shared state behind every API handler.
pub struct Daemon {
    pub config: DaemonConfig,
    pub containers: Arc<dyn ContainerLoader>,
    pub operations: OperationManager,
    pub host: HostCapabilities,
}

impl Daemon {
    /// Probe the host and build the container registry from `config`.
    pub fn init(config: DaemonConfig) -> Result<Self> {
        let host = HostCapabilities::probe(&config.idmap)?;
        let containers = Arc::new(ContainerRegistry::from_config(&config));
        info!("⚡ Daemon initialized with {} containers", config.containers.len());
        Ok(Self::new(config, containers, host))
    }

    pub fn new(
        config: DaemonConfig,
        containers: Arc<dyn ContainerLoader>,
        host: HostCapabilities,
    ) -> Self {
        Self {
            config,
            containers,
            operations: OperationManager::new(),
            host,
        }
    }
}
