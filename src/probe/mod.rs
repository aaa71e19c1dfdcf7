//! Host capability probes run at daemon startup.

use serde::Serialize;
use tracing::info;

use crate::config::IdmapConfig;
use crate::error::ProbeError;

pub mod arch;
pub mod exec;
pub mod idmap;

pub use arch::{Architecture, get_architectures};
pub use exec::{get_exec_path, replace_daemon};
pub use idmap::{IdmapEntry, IdmapSet, get_idmap_set};

/// What the host can do, as probed once at startup.
#[derive(Debug, Clone, Serialize)]
pub struct HostCapabilities {
    /// Primary architecture first.
    pub architectures: Vec<Architecture>,
    /// `None` when only privileged containers can run.
    pub idmap: Option<IdmapSet>,
    pub exec_path: String,
}

impl HostCapabilities {
    /// Probe the host. Only an undeterminable architecture is fatal.
    pub fn probe(idmap: &IdmapConfig) -> Result<Self, ProbeError> {
        let architectures = get_architectures()?;
        let idmap = get_idmap_set(idmap);
        let exec_path = get_exec_path();

        info!(
            "Host: architectures {:?}, unprivileged containers {}, binary {}",
            architectures.iter().map(|a| a.name()).collect::<Vec<_>>(),
            if idmap.is_some() { "available" } else { "unavailable" },
            exec_path
        );

        Ok(Self {
            architectures,
            idmap,
            exec_path,
        })
    }

    pub fn unprivileged_containers(&self) -> bool {
        self.idmap.is_some()
    }
}
