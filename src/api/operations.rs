use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use warp::reply::Response;

use super::error::ApiError;
use super::response::sync_response;
use crate::daemon::Daemon;
use crate::error::OperationError;
use crate::operation::Operation;

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    /// Seconds; negative or absent waits until the operation finishes.
    #[serde(default = "WaitQuery::forever")]
    pub timeout: i64,
}

impl WaitQuery {
    fn forever() -> i64 {
        -1
    }

    fn deadline(&self) -> Option<Duration> {
        u64::try_from(self.timeout).ok().map(Duration::from_secs)
    }
}

async fn lookup(daemon: &Daemon, id: &str) -> Result<Operation, ApiError> {
    let uuid = Uuid::parse_str(id).map_err(|_| OperationError::NotFound { id: id.to_string() })?;
    Ok(daemon.operations.get(uuid).await?)
}

/// `GET /operations`
pub async fn list(daemon: Arc<Daemon>) -> Result<Response, ApiError> {
    let operations = daemon.operations.list().await;
    let rendered: Vec<_> = operations.iter().map(Operation::render).collect();
    Ok(sync_response(rendered))
}

/// `GET /operations/{id}`
pub async fn get(daemon: Arc<Daemon>, id: String) -> Result<Response, ApiError> {
    let op = lookup(&daemon, &id).await?;
    Ok(sync_response(op.render()))
}

/// `DELETE /operations/{id}`
pub async fn cancel(daemon: Arc<Daemon>, id: String) -> Result<Response, ApiError> {
    let op = lookup(&daemon, &id).await?;
    let op = daemon.operations.cancel(op.id()).await?;
    Ok(sync_response(op.render()))
}

/// `GET /operations/{id}/wait`
pub async fn wait(daemon: Arc<Daemon>, id: String, query: WaitQuery) -> Result<Response, ApiError> {
    let op = lookup(&daemon, &id).await?;
    op.wait(query.deadline()).await;
    Ok(sync_response(op.render()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(-1 => None; "negative waits forever")]
    #[test_case(0 => Some(Duration::ZERO); "zero polls")]
    #[test_case(30 => Some(Duration::from_secs(30)); "positive is seconds")]
    fn test_wait_deadline(timeout: i64) -> Option<Duration> {
        WaitQuery { timeout }.deadline()
    }
}
