use async_trait::async_trait;

use super::Operation;
use crate::error::OperationError;

/// Optional per-operation handlers. Every method has a default, so an operation that
/// needs none of them uses [`NoHooks`].
#[async_trait]
pub trait OperationHooks: Send + Sync {
    /// Called once the operation is running, before its task.
    async fn on_run(&self, _op: &Operation) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether a running operation can be cancelled through [`Self::on_cancel`].
    fn may_cancel(&self) -> bool {
        false
    }

    /// Interrupt a running task.
    async fn on_cancel(&self, op: &Operation) -> Result<(), OperationError> {
        Err(OperationError::NotCancellable { id: op.id() })
    }

    /// Attach a client to the operation.
    async fn on_connect(&self, op: &Operation) -> Result<(), OperationError> {
        Err(OperationError::NotConnectable { id: op.id() })
    }
}

/// No hooks: not cancellable once running, not connectable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl OperationHooks for NoHooks {}
