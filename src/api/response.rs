//! JSON envelopes shared by every endpoint.

use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use crate::operation::{Operation, OperationInfo};

#[derive(Debug, Serialize)]
struct SyncEnvelope<T> {
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
    status_code: u16,
    metadata: T,
}

#[derive(Debug, Serialize)]
struct AsyncEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
    status_code: u16,
    operation: String,
    metadata: OperationInfo,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    error: &'a str,
    error_code: u16,
}

/// 200 with `metadata` as the result.
pub fn sync_response<T: Serialize>(metadata: T) -> Response {
    let body = SyncEnvelope {
        kind: "sync",
        status: "Success",
        status_code: 200,
        metadata,
    };
    warp::reply::with_status(warp::reply::json(&body), StatusCode::OK).into_response()
}

/// 202 pointing at a freshly created operation.
pub fn operation_response(op: &Operation) -> Response {
    let url = op.url();
    let body = AsyncEnvelope {
        kind: "async",
        status: "Operation created",
        status_code: 100,
        operation: url.clone(),
        metadata: op.render(),
    };
    let reply = warp::reply::with_status(warp::reply::json(&body), StatusCode::ACCEPTED);
    warp::reply::with_header(reply, "Location", url).into_response()
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    let body = ErrorEnvelope {
        kind: "error",
        error: message,
        error_code: status.as_u16(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}
