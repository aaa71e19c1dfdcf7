//! Tracked asynchronous operations.
//!
//! An [`Operation`] is created by the [`OperationManager`] for each accepted request. It
//! claims its resources for its whole lifetime, runs its task off the request path and
//! records a terminal status that stays inspectable afterwards.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::OperationError;

pub mod hooks;
pub mod manager;

pub use hooks::{NoHooks, OperationHooks};
pub use manager::OperationManager;

pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

/// The deferred body of an operation. Called exactly once, or never if cancelled first.
pub type Task = Box<dyn FnOnce() -> TaskFuture + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClass {
    /// Background work with no client interaction.
    Task,
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl OperationStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Pending => 105,
            Self::Running => 103,
            Self::Success => 200,
            Self::Failure => 400,
            Self::Cancelled => 401,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Resources an operation locks, by kind (e.g. `containers`) and id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resources(BTreeMap<String, BTreeSet<String>>);

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.0.entry(kind.into()).or_default().insert(id.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.0.iter().flat_map(|(kind, ids)| {
            ids.iter().map(move |id| (kind.as_str(), id.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resource URLs grouped by kind, e.g. `{"containers": ["/containers/web"]}`.
    pub fn urls(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(kind, ids)| {
                let urls = ids.iter().map(|id| format!("/{}/{}", kind, id)).collect();
                (kind.clone(), urls)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct OperationState {
    status: OperationStatus,
    updated_at: DateTime<Utc>,
    err: Option<String>,
}

struct OperationInner {
    id: Uuid,
    class: OperationClass,
    created_at: DateTime<Utc>,
    resources: Resources,
    hooks: Arc<dyn OperationHooks>,
    state: watch::Sender<OperationState>,
}

/// Shared handle to a tracked operation.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<OperationInner>,
}

/// Serialized view of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub id: Uuid,
    pub class: OperationClass,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: OperationStatus,
    pub status_code: u16,
    pub resources: BTreeMap<String, Vec<String>>,
    pub may_cancel: bool,
    pub err: String,
}

impl Operation {
    fn new(class: OperationClass, resources: Resources, hooks: Arc<dyn OperationHooks>) -> Self {
        let now = Utc::now();
        let (state, _) = watch::channel(OperationState {
            status: OperationStatus::Pending,
            updated_at: now,
            err: None,
        });

        Self {
            inner: Arc::new(OperationInner {
                id: Uuid::new_v4(),
                class,
                created_at: now,
                resources,
                hooks,
                state,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn class(&self) -> OperationClass {
        self.inner.class
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn resources(&self) -> &Resources {
        &self.inner.resources
    }

    pub fn url(&self) -> String {
        format!("/operations/{}", self.inner.id)
    }

    pub fn status(&self) -> OperationStatus {
        self.inner.state.borrow().status
    }

    /// Error of a failed operation.
    pub fn err(&self) -> Option<String> {
        self.inner.state.borrow().err.clone()
    }

    pub fn may_cancel(&self) -> bool {
        self.inner.hooks.may_cancel()
    }

    pub(crate) fn hooks(&self) -> &dyn OperationHooks {
        self.inner.hooks.as_ref()
    }

    /// Attach a client to the operation through its connect hook.
    pub async fn connect(&self) -> Result<(), OperationError> {
        self.hooks().on_connect(self).await
    }

    /// Wait until the operation reaches a terminal status, for at most `timeout`.
    ///
    /// Returns the status observed last, which is not final if the wait timed out.
    pub async fn wait(&self, timeout: Option<Duration>) -> OperationStatus {
        let mut state = self.inner.state.subscribe();
        let finished = async move {
            // The sender lives in `self`, so the channel can't close while we wait.
            let _ = state.wait_for(|state| state.status.is_final()).await;
        };

        match timeout {
            Some(timeout) => {
                let _ = tokio::time::timeout(timeout, finished).await;
            }
            None => finished.await,
        }
        self.status()
    }

    pub fn render(&self) -> OperationInfo {
        let state = self.inner.state.borrow().clone();
        OperationInfo {
            id: self.inner.id,
            class: self.inner.class,
            created_at: self.inner.created_at,
            updated_at: state.updated_at,
            status: state.status,
            status_code: state.status.code(),
            resources: self.inner.resources.urls(),
            may_cancel: self.may_cancel(),
            err: state.err.unwrap_or_default(),
        }
    }

    /// Move to `to` if the current status is one of `from`. Returns whether it moved.
    pub(crate) fn transition(
        &self,
        from: &[OperationStatus],
        to: OperationStatus,
        err: Option<String>,
    ) -> bool {
        self.inner.state.send_if_modified(|state| {
            if !from.contains(&state.status) {
                return false;
            }
            state.status = to;
            state.updated_at = Utc::now();
            state.err = err;
            true
        })
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class)
            .field("status", &self.status())
            .field("resources", &self.inner.resources)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resources_urls() {
        let resources = Resources::new()
            .with("containers", "web")
            .with("containers", "db")
            .with("containers", "web");

        let mut expected = BTreeMap::new();
        expected.insert(
            "containers".to_string(),
            vec!["/containers/db".to_string(), "/containers/web".to_string()],
        );
        assert_eq!(resources.urls(), expected);
        assert_eq!(resources.iter().count(), 2);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let op = Operation::new(OperationClass::Task, Resources::new(), Arc::new(NoHooks));
        assert_eq!(op.status(), OperationStatus::Pending);

        assert!(!op.transition(&[OperationStatus::Running], OperationStatus::Success, None));
        assert!(op.transition(&[OperationStatus::Pending], OperationStatus::Running, None));
        assert!(op.transition(
            &[OperationStatus::Running],
            OperationStatus::Failure,
            Some("boom".to_string())
        ));
        assert!(!op.transition(&[OperationStatus::Pending], OperationStatus::Running, None));

        let info = op.render();
        assert_eq!(info.status, OperationStatus::Failure);
        assert_eq!(info.status_code, 400);
        assert_eq!(info.err, "boom");
        assert!(!info.may_cancel);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OperationStatus::Pending.code(), 105);
        assert_eq!(OperationStatus::Running.code(), 103);
        assert_eq!(OperationStatus::Cancelled.code(), 401);
        assert!(!OperationStatus::Running.is_final());
        assert!(OperationStatus::Cancelled.is_final());
    }

    #[test]
    fn test_render_serializes_operation_fields() {
        let op = Operation::new(
            OperationClass::Task,
            Resources::new().with("containers", "web"),
            Arc::new(NoHooks),
        );
        let json = serde_json::to_value(op.render()).unwrap();
        assert_eq!(json["class"], "task");
        assert_eq!(json["status"], "Pending");
        assert_eq!(json["status_code"], 105);
        assert_eq!(json["resources"]["containers"][0], "/containers/web");
        assert_eq!(json["err"], "");
    }

    #[tokio::test]
    async fn test_connect_without_hook_fails() {
        let op = Operation::new(OperationClass::Task, Resources::new(), Arc::new(NoHooks));
        assert!(matches!(
            op.connect().await,
            Err(OperationError::NotConnectable { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_times_out_on_pending() {
        let op = Operation::new(OperationClass::Task, Resources::new(), Arc::new(NoHooks));
        let status = op.wait(Some(Duration::from_millis(20))).await;
        assert_eq!(status, OperationStatus::Pending);
    }

    #[test]
    fn test_wait_wakes_on_terminal_status() {
        let op = Operation::new(OperationClass::Task, Resources::new(), Arc::new(NoHooks));
        let mut wait = tokio_test::task::spawn(op.wait(None));
        tokio_test::assert_pending!(wait.poll());

        assert!(op.transition(&[OperationStatus::Pending], OperationStatus::Running, None));
        tokio_test::assert_pending!(wait.poll());

        let err = Some("boom".to_string());
        assert!(op.transition(&[OperationStatus::Running], OperationStatus::Failure, err));
        assert!(wait.is_woken());
        tokio_test::assert_ready_eq!(wait.poll(), OperationStatus::Failure);
    }
}
