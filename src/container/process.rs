use async_trait::async_trait;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use super::{Container, ContainerState, ContainerStatus};
use crate::config::ContainerSpec;
use crate::error::LifecycleError;

/// A container backed by a single host process, driven with signals.
///
/// Freeze and unfreeze map to SIGSTOP/SIGCONT, forced stop to SIGKILL and graceful
/// shutdown to SIGTERM followed by a bounded wait for the process to exit.
pub struct ProcessContainer {
    name: String,
    spec: ContainerSpec,
    process: Mutex<Option<RunningProcess>>,
}

struct RunningProcess {
    pid: u32,
    frozen: bool,
    exited: watch::Receiver<bool>,
}

impl RunningProcess {
    fn is_alive(&self) -> bool {
        !*self.exited.borrow()
    }
}

impl ProcessContainer {
    pub fn new(name: impl Into<String>, spec: ContainerSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            process: Mutex::new(None),
        }
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<(), LifecycleError> {
        debug!("Sending {} to container {} (pid {})", signal, self.name, pid);
        kill(Pid::from_raw(pid as i32), signal).map_err(|source| LifecycleError::Signal {
            name: self.name.clone(),
            source,
        })
    }

    fn not_running(&self) -> LifecycleError {
        LifecycleError::NotRunning {
            name: self.name.clone(),
        }
    }

    /// Sends `signal` to the live process and returns a receiver that flips once it exits.
    async fn signal_for_exit(
        &self,
        signals: &[Signal],
    ) -> Result<watch::Receiver<bool>, LifecycleError> {
        let mut process = self.process.lock().await;
        let running = process
            .as_mut()
            .filter(|running| running.is_alive())
            .ok_or_else(|| self.not_running())?;

        for signal in signals {
            self.signal(running.pid, *signal)?;
        }
        running.frozen = false;
        Ok(running.exited.clone())
    }
}

async fn wait_exit(mut exited: watch::Receiver<bool>) {
    // A closed channel means the reaper is gone, which only happens after it published.
    let _ = exited.wait_for(|exited| *exited).await;
}

#[async_trait]
impl Container for ProcessContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        let mut process = self.process.lock().await;
        if process.as_ref().is_some_and(RunningProcess::is_alive) {
            return Err(LifecycleError::AlreadyRunning {
                name: self.name.clone(),
            });
        }

        let (program, args) = self
            .spec
            .command
            .split_first()
            .ok_or_else(|| LifecycleError::NoCommand {
                name: self.name.clone(),
            })?;

        let mut command = Command::new(program);
        command.args(args).envs(&self.spec.env).stdin(Stdio::null());
        if let Some(dir) = &self.spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| LifecycleError::Spawn {
            name: self.name.clone(),
            source,
        })?;
        let pid = child.id().ok_or_else(|| self.not_running())?;

        let (tx, exited) = watch::channel(false);
        let name = self.name.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("Container {} exited: {}", name, status),
                Err(e) => warn!("Failed to wait for container {}: {}", name, e),
            }
            let _ = tx.send(true);
        });

        info!("🚀 Started container {} (pid {})", self.name, pid);
        *process = Some(RunningProcess {
            pid,
            frozen: false,
            exited,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        info!("🛑 Killing container {}", self.name);
        let exited = self.signal_for_exit(&[Signal::SIGKILL]).await?;
        wait_exit(exited).await;
        Ok(())
    }

    async fn shutdown(&self, timeout: Option<Duration>) -> Result<(), LifecycleError> {
        info!(
            "🛑 Shutting down container {} (timeout: {:?})",
            self.name, timeout
        );
        // A stopped process can't act on SIGTERM, so resume it first.
        let exited = self
            .signal_for_exit(&[Signal::SIGCONT, Signal::SIGTERM])
            .await?;

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait_exit(exited))
                .await
                .map_err(|_| LifecycleError::ShutdownTimeout {
                    name: self.name.clone(),
                    timeout,
                }),
            None => {
                wait_exit(exited).await;
                Ok(())
            }
        }
    }

    async fn freeze(&self) -> Result<(), LifecycleError> {
        let mut process = self.process.lock().await;
        let running = process
            .as_mut()
            .filter(|running| running.is_alive())
            .ok_or_else(|| self.not_running())?;
        if running.frozen {
            return Err(LifecycleError::AlreadyFrozen {
                name: self.name.clone(),
            });
        }

        self.signal(running.pid, Signal::SIGSTOP)?;
        running.frozen = true;
        info!("❄️  Froze container {}", self.name);
        Ok(())
    }

    async fn unfreeze(&self) -> Result<(), LifecycleError> {
        let mut process = self.process.lock().await;
        let running = process
            .as_mut()
            .filter(|running| running.is_alive() && running.frozen)
            .ok_or_else(|| LifecycleError::NotFrozen {
                name: self.name.clone(),
            })?;

        self.signal(running.pid, Signal::SIGCONT)?;
        running.frozen = false;
        info!("Unfroze container {}", self.name);
        Ok(())
    }

    async fn render_state(&self) -> Result<ContainerState, LifecycleError> {
        let process = self.process.lock().await;
        let state = match process.as_ref().filter(|running| running.is_alive()) {
            Some(running) if running.frozen => {
                ContainerState::new(ContainerStatus::Frozen, Some(running.pid))
            }
            Some(running) => ContainerState::new(ContainerStatus::Running, Some(running.pid)),
            None => ContainerState::new(ContainerStatus::Stopped, None),
        };
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(command: &[&str]) -> ProcessContainer {
        ProcessContainer::new(
            "test",
            ContainerSpec {
                command: command.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        )
    }

    async fn status(container: &ProcessContainer) -> ContainerStatus {
        container.render_state().await.unwrap().status
    }

    #[tokio::test]
    async fn test_start_freeze_unfreeze_stop() {
        let c = container(&["sleep", "30"]);
        assert_eq!(status(&c).await, ContainerStatus::Stopped);

        c.start().await.unwrap();
        assert_eq!(status(&c).await, ContainerStatus::Running);
        assert!(matches!(
            c.start().await,
            Err(LifecycleError::AlreadyRunning { .. })
        ));

        c.freeze().await.unwrap();
        assert_eq!(status(&c).await, ContainerStatus::Frozen);
        assert!(matches!(
            c.freeze().await,
            Err(LifecycleError::AlreadyFrozen { .. })
        ));

        c.unfreeze().await.unwrap();
        assert_eq!(status(&c).await, ContainerStatus::Running);

        c.stop().await.unwrap();
        assert_eq!(status(&c).await, ContainerStatus::Stopped);
        assert!(matches!(c.stop().await, Err(LifecycleError::NotRunning { .. })));
    }

    #[tokio::test]
    async fn test_graceful_shutdown_of_frozen_container() {
        let c = container(&["sleep", "30"]);
        c.start().await.unwrap();
        c.freeze().await.unwrap();

        c.shutdown(Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(status(&c).await, ContainerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_deadline_is_distinguishable() {
        let c = container(&["sh", "-c", "trap '' TERM; sleep 30"]);
        c.start().await.unwrap();
        // Let the shell install its trap before signalling.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = c
            .shutdown(Some(Duration::from_millis(300)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(status(&c).await, ContainerStatus::Running);

        c.stop().await.unwrap();
        assert_eq!(status(&c).await, ContainerStatus::Stopped);
    }

    #[tokio::test]
    async fn test_exited_process_renders_stopped() {
        let c = container(&["true"]);
        c.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(status(&c).await, ContainerStatus::Stopped);
        c.start().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let c = container(&["/nonexistent/boltd-test-binary"]);
        let err = c.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Spawn { .. }));

        // The OS error appears once in the chained form an operation records.
        let chained = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(chained.matches("No such file or directory").count(), 1, "{}", chained);
        assert!(chained.starts_with("Failed to spawn container"), "{}", chained);
    }
}
