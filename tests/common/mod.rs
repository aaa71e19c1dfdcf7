#![allow(dead_code)]

use async_trait::async_trait;
use boltd::config::DaemonConfig;
use boltd::container::{Container, ContainerRegistry, ContainerState, ContainerStatus};
use boltd::daemon::Daemon;
use boltd::error::LifecycleError;
use boltd::probe::{Architecture, HostCapabilities};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// A capability call observed by [`RecordingContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Start,
    Stop,
    Shutdown(Option<Duration>),
    Freeze,
    Unfreeze,
}

/// Test double that records every capability call and tracks a simple run state.
pub struct RecordingContainer {
    name: String,
    status: Mutex<ContainerStatus>,
    calls: Mutex<Vec<Call>>,
    fail_start: bool,
    fail_stop: bool,
    fail_shutdown: bool,
    fail_freeze: bool,
    fail_unfreeze: bool,
    gate: Option<Arc<Notify>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingContainer {
    pub fn new(name: &str, status: ContainerStatus) -> Self {
        Self {
            name: name.to_string(),
            status: Mutex::new(status),
            calls: Mutex::new(Vec::new()),
            fail_start: false,
            fail_stop: false,
            fail_shutdown: false,
            fail_freeze: false,
            fail_unfreeze: false,
            gate: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Every shutdown reports an expired deadline.
    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub fn failing_freeze(mut self) -> Self {
        self.fail_freeze = true;
        self
    }

    pub fn failing_unfreeze(mut self) -> Self {
        self.fail_unfreeze = true;
        self
    }

    /// Every call blocks until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status(&self) -> ContainerStatus {
        *self.status.lock().unwrap()
    }

    /// Highest number of capability calls that were in flight at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn record(&self, call: Call) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn set_status(&self, status: ContainerStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl Container for RecordingContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.record(Call::Start).await;
        if self.fail_start {
            return Err(LifecycleError::NoCommand {
                name: self.name.clone(),
            });
        }
        self.set_status(ContainerStatus::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        self.record(Call::Stop).await;
        if self.fail_stop {
            return Err(LifecycleError::NotRunning {
                name: self.name.clone(),
            });
        }
        self.set_status(ContainerStatus::Stopped);
        Ok(())
    }

    async fn shutdown(&self, timeout: Option<Duration>) -> Result<(), LifecycleError> {
        self.record(Call::Shutdown(timeout)).await;
        if self.fail_shutdown {
            return Err(LifecycleError::ShutdownTimeout {
                name: self.name.clone(),
                timeout: timeout.unwrap_or_default(),
            });
        }
        self.set_status(ContainerStatus::Stopped);
        Ok(())
    }

    async fn freeze(&self) -> Result<(), LifecycleError> {
        self.record(Call::Freeze).await;
        if self.fail_freeze {
            return Err(LifecycleError::AlreadyFrozen {
                name: self.name.clone(),
            });
        }
        self.set_status(ContainerStatus::Frozen);
        Ok(())
    }

    async fn unfreeze(&self) -> Result<(), LifecycleError> {
        self.record(Call::Unfreeze).await;
        if self.fail_unfreeze {
            return Err(LifecycleError::NotFrozen {
                name: self.name.clone(),
            });
        }
        self.set_status(ContainerStatus::Running);
        Ok(())
    }

    async fn render_state(&self) -> Result<ContainerState, LifecycleError> {
        Ok(ContainerState::new(self.status(), None))
    }
}

pub fn test_host() -> HostCapabilities {
    HostCapabilities {
        architectures: vec![Architecture::X86_64, Architecture::I686],
        idmap: None,
        exec_path: "/usr/bin/boltd".to_string(),
    }
}

/// A daemon serving exactly `containers`.
pub async fn test_daemon(containers: &[Arc<RecordingContainer>]) -> Arc<Daemon> {
    let registry = ContainerRegistry::new();
    for container in containers {
        registry.insert(container.clone()).await;
    }
    Arc::new(Daemon::new(
        DaemonConfig::default(),
        Arc::new(registry),
        test_host(),
    ))
}
