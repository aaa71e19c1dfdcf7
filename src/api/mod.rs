//! REST API served by the daemon.
//!
//! Responses use the `sync`, `async` and `error` envelopes of [`response`]. State changes
//! never complete inline: a valid `PUT /containers/{name}/state` answers 202 with the URL
//! of the operation that performs it.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::daemon::Daemon;
use crate::error::{BoltdError, Result};

pub mod containers;
pub mod error;
pub mod operations;
pub mod response;
pub mod server;

pub use error::ApiError;

/// HTTP front end bound to a single address.
pub struct ApiServer {
    daemon: Arc<Daemon>,
    address: SocketAddr,
}

impl ApiServer {
    pub fn new(daemon: Arc<Daemon>) -> Result<Self> {
        let address = daemon.config.server.socket_addr()?;
        Ok(Self { daemon, address })
    }

    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        tracing::info!("🚀 Starting API server on {}", self.address);

        let (bound, server) = warp::serve(routes(self.daemon))
            .try_bind_with_graceful_shutdown(self.address, shutdown)
            .map_err(|e| {
                BoltdError::Other(anyhow::anyhow!("failed to bind {}: {}", self.address, e))
            })?;

        tracing::info!("✅ API server listening on http://{}", bound);
        server.await;
        tracing::info!("API server stopped");
        Ok(())
    }
}

fn respond(result: std::result::Result<Response, ApiError>) -> Response {
    result.unwrap_or_else(|err| {
        tracing::debug!("Request failed: {}", err);
        err.into_response()
    })
}

/// Every route of the API, with rejections rendered as error envelopes.
pub fn routes(
    daemon: Arc<Daemon>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let daemon_clone = daemon.clone();
    let server_info = warp::path::end().and(warp::get()).and_then(move || {
        let d = daemon_clone.clone();
        async move { Ok::<_, Rejection>(respond(server::info(d).await)) }
    });

    let daemon_clone = daemon.clone();
    let state_get = warp::path!("containers" / String / "state")
        .and(warp::get())
        .and_then(move |name: String| {
            let d = daemon_clone.clone();
            async move { Ok::<_, Rejection>(respond(containers::state_get(d, name).await)) }
        });

    let daemon_clone = daemon.clone();
    let state_put = warp::path!("containers" / String / "state")
        .and(warp::put())
        .and(warp::body::bytes())
        .and_then(move |name: String, body: bytes::Bytes| {
            let d = daemon_clone.clone();
            async move { Ok::<_, Rejection>(respond(containers::state_put(d, name, body).await)) }
        });

    let daemon_clone = daemon.clone();
    let operations_list = warp::path!("operations")
        .and(warp::get())
        .and_then(move || {
            let d = daemon_clone.clone();
            async move { Ok::<_, Rejection>(respond(operations::list(d).await)) }
        });

    let daemon_clone = daemon.clone();
    let operation_get = warp::path!("operations" / String)
        .and(warp::get())
        .and_then(move |id: String| {
            let d = daemon_clone.clone();
            async move { Ok::<_, Rejection>(respond(operations::get(d, id).await)) }
        });

    let daemon_clone = daemon.clone();
    let operation_cancel = warp::path!("operations" / String)
        .and(warp::delete())
        .and_then(move |id: String| {
            let d = daemon_clone.clone();
            async move { Ok::<_, Rejection>(respond(operations::cancel(d, id).await)) }
        });

    let daemon_clone = daemon;
    let operation_wait = warp::path!("operations" / String / "wait")
        .and(warp::get())
        .and(warp::query::<operations::WaitQuery>())
        .and_then(move |id: String, query: operations::WaitQuery| {
            let d = daemon_clone.clone();
            async move { Ok::<_, Rejection>(respond(operations::wait(d, id, query).await)) }
        });

    server_info
        .or(state_get)
        .or(state_put)
        .or(operations_list)
        .or(operation_get)
        .or(operation_cancel)
        .or(operation_wait)
        .recover(handle_rejection)
        .with(warp::log("boltd::api"))
}

async fn handle_rejection(rejection: Rejection) -> std::result::Result<Response, Infallible> {
    let err = if rejection.is_not_found() {
        ApiError::NotFound("not found".to_string())
    } else if let Some(invalid) = rejection.find::<warp::reject::InvalidQuery>() {
        ApiError::BadRequest(invalid.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiError::MethodNotAllowed
    } else {
        ApiError::Internal(format!("unhandled rejection: {:?}", rejection))
    };
    Ok(err.into_response())
}
