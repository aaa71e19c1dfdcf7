use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Boltd error types
#[derive(Error, Debug)]
pub enum BoltdError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Container lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Host probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Idmap error: {0}")]
    Idmap(#[from] IdmapError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    Serialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found at path: {path}")]
    NotFound { path: String },

    #[error("Invalid config format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Invalid bind address {address}: {reason}")]
    InvalidBindAddress { address: String, reason: String },
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Container not found: {name}")]
    ContainerNotFound { name: String },

    #[error("The container is already running: {name}")]
    AlreadyRunning { name: String },

    #[error("The container is already stopped: {name}")]
    NotRunning { name: String },

    #[error("The container is already frozen: {name}")]
    AlreadyFrozen { name: String },

    #[error("The container is not frozen: {name}")]
    NotFrozen { name: String },

    #[error("Container {name} did not shut down within {timeout:?}")]
    ShutdownTimeout { name: String, timeout: Duration },

    #[error("Failed to spawn container {name}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal container {name}")]
    Signal {
        name: String,
        #[source]
        source: nix::Error,
    },

    #[error("Container {name} has no command configured")]
    NoCommand { name: String },
}

impl LifecycleError {
    /// True for the graceful-shutdown deadline, as opposed to every other failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ShutdownTimeout { .. })
    }
}

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Resource {kind}/{id} is locked by operation {holder}")]
    ResourceBusy { kind: String, id: String, holder: Uuid },

    #[error("Operation id {id} is already registered")]
    DuplicateId { id: Uuid },

    #[error("Operation not found: {id}")]
    NotFound { id: String },

    #[error("Operation {id} can't be cancelled")]
    NotCancellable { id: Uuid },

    #[error("Operation {id} has already finished")]
    AlreadyFinished { id: Uuid },

    #[error("Operation {id} doesn't accept connections")]
    NotConnectable { id: Uuid },

    #[error("Operation task panicked: {message}")]
    TaskPanicked { message: String },
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Unknown architecture: {name}")]
    UnknownArchitecture { name: String },

    #[error("Failed to query the local architecture: {0}")]
    Uname(#[from] nix::Error),

    #[error("Failed to execute {path}: {source}")]
    Exec {
        path: String,
        #[source]
        source: nix::Error,
    },

    #[error("Invalid exec argument: {0}")]
    InvalidArgument(#[from] std::ffi::NulError),
}

#[derive(Error, Debug)]
pub enum IdmapError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed idmap entry in {path}: {line}")]
    Malformed { path: String, line: String },

    #[error("Host range {host_id}+{range} is not mapped in the current namespace")]
    Unusable { host_id: u64, range: u64 },
}

/// Convenience type alias for Boltd results
pub type Result<T, E = BoltdError> = std::result::Result<T, E>;
