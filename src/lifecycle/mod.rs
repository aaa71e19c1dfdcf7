//! Action resolver and lifecycle executor.
//!
//! A state-change request is validated and compiled into a single [`Task`] before any
//! operation exists. The task then runs the ordered capability calls for its action.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::container::Container;
use crate::error::LifecycleError;
use crate::operation::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Freeze,
    Unfreeze,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown action {0}")]
pub struct UnknownAction(pub String);

impl FromStr for ContainerAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "freeze" => Ok(Self::Freeze),
            "unfreeze" => Ok(Self::Unfreeze),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
        };
        f.write_str(name)
    }
}

/// Body of `PUT /containers/{name}/state`.
///
/// `timeout` defaults to -1 (wait forever), which is not the same as 0 (stop now).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeRequest {
    pub action: String,
    #[serde(default = "StateChangeRequest::no_timeout")]
    pub timeout: i64,
    #[serde(default)]
    pub force: bool,
}

impl StateChangeRequest {
    pub const NO_TIMEOUT: i64 = -1;

    fn no_timeout() -> i64 {
        Self::NO_TIMEOUT
    }

    pub fn new(action: ContainerAction) -> Self {
        Self {
            action: action.to_string(),
            timeout: Self::NO_TIMEOUT,
            force: false,
        }
    }

    pub fn action(&self) -> Result<ContainerAction, UnknownAction> {
        self.action.parse()
    }

    pub fn stop_mode(&self) -> StopMode {
        StopMode::from_request(self.timeout, self.force)
    }
}

/// How the stop phase of `stop` and `restart` is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Forced stop, no grace period.
    Immediate,
    /// Orderly shutdown waiting up to the deadline, or forever when `None`.
    Graceful(Option<Duration>),
}

impl StopMode {
    pub fn from_request(timeout: i64, force: bool) -> Self {
        if force || timeout == 0 {
            Self::Immediate
        } else if timeout < 0 {
            Self::Graceful(None)
        } else {
            Self::Graceful(Some(Duration::from_secs(timeout as u64)))
        }
    }
}

impl ContainerAction {
    /// Run this action against `container`. Steps run strictly in order.
    pub async fn execute(
        self,
        container: &dyn Container,
        mode: StopMode,
    ) -> Result<(), LifecycleError> {
        match self {
            Self::Start => start(container).await,
            Self::Stop => halt(container, mode).await,
            Self::Restart => restart(container, mode).await,
            Self::Freeze => freeze(container).await,
            Self::Unfreeze => unfreeze(container).await,
        }
    }
}

async fn start(container: &dyn Container) -> Result<(), LifecycleError> {
    container.start().await
}

async fn halt(container: &dyn Container, mode: StopMode) -> Result<(), LifecycleError> {
    match mode {
        StopMode::Immediate => container.stop().await,
        StopMode::Graceful(timeout) => container.shutdown(timeout).await,
    }
}

/// Stop then start. A failed stop ends the task before start is attempted. A failed start
/// leaves the container stopped; nothing is rolled back.
async fn restart(container: &dyn Container, mode: StopMode) -> Result<(), LifecycleError> {
    if let Err(e) = halt(container, mode).await {
        warn!(
            "Restart of {} aborted, stop phase failed: {}",
            container.name(),
            e
        );
        return Err(e);
    }
    start(container).await
}

async fn freeze(container: &dyn Container) -> Result<(), LifecycleError> {
    container.freeze().await
}

async fn unfreeze(container: &dyn Container) -> Result<(), LifecycleError> {
    container.unfreeze().await
}

/// Validate `request` and compile it into the deferred task for `container`.
///
/// Nothing is called on the container until the returned task runs.
pub fn resolve(
    request: &StateChangeRequest,
    container: Arc<dyn Container>,
) -> Result<Task, UnknownAction> {
    let action = request.action()?;
    let mode = request.stop_mode();

    let task: Task = Box::new(move || {
        async move {
            info!("{} container {} ({:?})", action, container.name(), mode);
            action.execute(container.as_ref(), mode).await?;
            info!("{} of container {} complete", action, container.name());
            Ok::<_, anyhow::Error>(())
        }
        .boxed()
    });
    Ok(task)
}
