use thiserror::Error;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

use super::response::error_response;
use crate::error::{LifecycleError, OperationError};
use crate::lifecycle::UnknownAction;

/// Errors detected while handling a request, before or instead of creating an operation.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),

    #[error("{0}")]
    BadRequest(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    OperationCreation(OperationError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Decode(_) | Self::UnknownAction(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::OperationCreation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Lookup failures become 404s; anything else from the container layer is internal.
impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::ContainerNotFound { .. } => Self::NotFound(err.to_string()),
            other => Self::Internal(error_chain(&other)),
        }
    }
}

/// `err` followed by each of its sources, `: `-separated.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::NotFound { .. } => Self::NotFound(err.to_string()),
            OperationError::NotCancellable { .. }
            | OperationError::AlreadyFinished { .. }
            | OperationError::NotConnectable { .. } => Self::BadRequest(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl Reply for ApiError {
    fn into_response(self) -> Response {
        error_response(self.status(), &self.to_string())
    }
}
