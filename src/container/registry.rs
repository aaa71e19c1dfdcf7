use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Container, ContainerLoader, ProcessContainer};
use crate::config::DaemonConfig;
use crate::error::LifecycleError;

/// In-memory name → capability table.
#[derive(Default, Clone)]
pub struct ContainerRegistry {
    containers: Arc<RwLock<HashMap<String, Arc<dyn Container>>>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding one [`ProcessContainer`] per `[containers.<name>]` entry.
    pub fn from_config(config: &DaemonConfig) -> Self {
        let containers = config
            .containers
            .iter()
            .map(|(name, spec)| {
                let container: Arc<dyn Container> =
                    Arc::new(ProcessContainer::new(name.clone(), spec.clone()));
                (name.clone(), container)
            })
            .collect();

        Self {
            containers: Arc::new(RwLock::new(containers)),
        }
    }

    pub async fn insert(&self, container: Arc<dyn Container>) {
        let name = container.name().to_string();
        debug!("Registering container {}", name);
        self.containers.write().await.insert(name, container);
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ContainerLoader for ContainerRegistry {
    async fn load(&self, name: &str) -> Result<Arc<dyn Container>, LifecycleError> {
        self.containers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| LifecycleError::ContainerNotFound {
                name: name.to_string(),
            })
    }
}
