use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};
use warp::reply::Response;

use super::error::ApiError;
use super::response::{operation_response, sync_response};
use crate::daemon::Daemon;
use crate::lifecycle::{self, StateChangeRequest};
use crate::operation::{NoHooks, OperationClass, Resources};

/// `GET /containers/{name}/state`
pub async fn state_get(daemon: Arc<Daemon>, name: String) -> Result<Response, ApiError> {
    let container = daemon.containers.load(&name).await?;
    let state = container.render_state().await?;

    Ok(sync_response(state.status.to_string()))
}

/// `PUT /containers/{name}/state`
///
/// Every check runs before the operation exists: a rejected request leaves no operation
/// behind and never touches the container.
pub async fn state_put(
    daemon: Arc<Daemon>,
    name: String,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: StateChangeRequest = serde_json::from_slice(&body)?;
    debug!("State change for {}: {:?}", name, request);

    let container = daemon.containers.load(&name).await?;
    let task = lifecycle::resolve(&request, container)?;

    let resources = Resources::new().with("containers", name.as_str());
    let op = daemon
        .operations
        .create(OperationClass::Task, resources, task, Arc::new(NoHooks))
        .await
        .map_err(ApiError::OperationCreation)?;

    info!("🔄 {} container {} as operation {}", request.action, name, op.id());
    Ok(operation_response(&op))
}
