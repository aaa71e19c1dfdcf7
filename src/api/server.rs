use serde::Serialize;
use std::sync::Arc;
use warp::reply::Response;

use super::error::ApiError;
use super::response::sync_response;
use crate::daemon::Daemon;
use crate::probe::Architecture;

pub const API_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub api_version: &'static str,
    pub environment: ServerEnvironment,
}

#[derive(Debug, Serialize)]
pub struct ServerEnvironment {
    pub architectures: Vec<Architecture>,
    pub server: &'static str,
    pub server_name: String,
    pub server_version: &'static str,
    pub unprivileged_containers: bool,
    pub exec_path: String,
}

/// `GET /`
pub async fn info(daemon: Arc<Daemon>) -> Result<Response, ApiError> {
    let server_name = hostname::get()
        .map_err(|e| ApiError::Internal(format!("failed to read hostname: {}", e)))?
        .to_string_lossy()
        .into_owned();

    Ok(sync_response(ServerInfo {
        api_version: API_VERSION,
        environment: ServerEnvironment {
            architectures: daemon.host.architectures.clone(),
            server: env!("CARGO_PKG_NAME"),
            server_name,
            server_version: env!("CARGO_PKG_VERSION"),
            unprivileged_containers: daemon.host.unprivileged_containers(),
            exec_path: daemon.host.exec_path.clone(),
        },
    }))
}
