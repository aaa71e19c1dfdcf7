use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::{Operation, OperationClass, OperationHooks, OperationStatus, Resources, Task};
use crate::error::OperationError;

type ResourceKey = (String, String);

/// Registry and scheduler for operations.
///
/// Each `(kind, id)` resource is held by at most one unfinished operation. A create that
/// touches a held resource fails and nothing is registered or run.
#[derive(Clone, Default)]
pub struct OperationManager {
    operations: Arc<RwLock<HashMap<Uuid, Operation>>>,
    locks: Arc<Mutex<HashMap<ResourceKey, Uuid>>>,
}

impl OperationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new operation, claim its resources and schedule `task`.
    ///
    /// Returns as soon as the task is scheduled. The operation is visible to
    /// [`Self::get`] from this point, starting out `Pending`.
    pub async fn create(
        &self,
        class: OperationClass,
        resources: Resources,
        task: Task,
        hooks: Arc<dyn OperationHooks>,
    ) -> Result<Operation, OperationError> {
        let op = Operation::new(class, resources, hooks);
        let id = op.id();

        {
            let mut locks = self.locks.lock().await;
            for (kind, resource) in op.resources().iter() {
                if let Some(holder) = locks.get(&(kind.to_string(), resource.to_string())) {
                    debug!("{}/{} is held by operation {}", kind, resource, holder);
                    return Err(OperationError::ResourceBusy {
                        kind: kind.to_string(),
                        id: resource.to_string(),
                        holder: *holder,
                    });
                }
            }

            let mut operations = self.operations.write().await;
            if operations.contains_key(&id) {
                return Err(OperationError::DuplicateId { id });
            }
            for (kind, resource) in op.resources().iter() {
                locks.insert((kind.to_string(), resource.to_string()), id);
            }
            operations.insert(id, op.clone());
        }

        info!("New {} operation {}", class, id);
        let span = info_span!("operation", id = %id, class = %class);
        tokio::spawn(self.clone().run(op.clone(), task).instrument(span));

        Ok(op)
    }

    async fn run(self, op: Operation, task: Task) {
        if !op.transition(&[OperationStatus::Pending], OperationStatus::Running, None) {
            debug!("Operation {} was cancelled before it started", op.id());
            return;
        }
        debug!("Running operation {}", op.id());

        let result = match op.hooks().on_run(&op).await {
            Ok(()) => AssertUnwindSafe(async move { task().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(OperationError::TaskPanicked {
                        message: panic_message(panic),
                    }
                    .into())
                }),
            Err(e) => Err(e),
        };

        let (status, err) = match result {
            Ok(()) => {
                info!("Operation {} succeeded", op.id());
                (OperationStatus::Success, None)
            }
            Err(e) => {
                let err = format!("{:#}", e);
                warn!("Operation {} failed: {}", op.id(), err);
                (OperationStatus::Failure, Some(err))
            }
        };
        self.finish(&op, status, err).await;
    }

    /// Publish the terminal status and give the resources back.
    ///
    /// Both happen under the lock table, so a waiter that sees the terminal status can
    /// immediately claim the same resources again.
    async fn finish(&self, op: &Operation, status: OperationStatus, err: Option<String>) {
        let mut locks = self.locks.lock().await;
        op.transition(&[OperationStatus::Running], status, err);
        locks.retain(|_, holder| *holder != op.id());
    }

    pub async fn get(&self, id: Uuid) -> Result<Operation, OperationError> {
        self.operations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| OperationError::NotFound { id: id.to_string() })
    }

    /// All operations, oldest first. Finished operations are retained.
    pub async fn list(&self) -> Vec<Operation> {
        let mut operations: Vec<Operation> =
            self.operations.read().await.values().cloned().collect();
        operations.sort_by_key(Operation::created_at);
        operations
    }

    /// Id of the unfinished operation holding `kind/id`, if any.
    pub async fn holder(&self, kind: &str, id: &str) -> Option<Uuid> {
        self.locks
            .lock()
            .await
            .get(&(kind.to_string(), id.to_string()))
            .copied()
    }

    /// Cancel an operation.
    ///
    /// A pending operation is marked `Cancelled` and its task never runs. A running one
    /// is only cancelled if its hooks support it; the task keeps its resources until it
    /// actually returns.
    pub async fn cancel(&self, id: Uuid) -> Result<Operation, OperationError> {
        let op = self.get(id).await?;

        {
            let mut locks = self.locks.lock().await;
            if op.transition(&[OperationStatus::Pending], OperationStatus::Cancelled, None) {
                locks.retain(|_, holder| *holder != id);
                info!("Operation {} cancelled before running", id);
                return Ok(op);
            }
        }

        match op.status() {
            OperationStatus::Running => {
                op.hooks().on_cancel(&op).await?;
                // The task may have finished while the hook ran.
                if !op.transition(&[OperationStatus::Running], OperationStatus::Cancelled, None) {
                    return Err(OperationError::AlreadyFinished { id });
                }
                info!("Operation {} cancelled", id);
                Ok(op)
            }
            _ => Err(OperationError::AlreadyFinished { id }),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
