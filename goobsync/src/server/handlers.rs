//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use http::{HeaderMap, StatusCode};
use rpc_contract::{
    codes, DeployRequest, Method, RpcRequest, RpcResponse, API_KEY_HEADER, JSONRPC_VERSION,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::errors::EngineError;
use crate::rpc::dispatch::dispatch;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "goobsync".to_string(),
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// JSON-RPC endpoint. Protocol and method failures are reported in the
/// response's `error` member with HTTP 200; only an auth failure changes the
/// status.
pub async fn rpc_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return reply(Value::Null, Err((codes::PARSE_ERROR, e.to_string()))),
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let request: RpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => return reply(id, Err((codes::INVALID_REQUEST, e.to_string()))),
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return reply(
            id,
            Err((codes::INVALID_REQUEST, format!("unsupported jsonrpc version {}", request.jsonrpc))),
        );
    }

    let method: Method = match request.method.parse() {
        Ok(method) => method,
        Err(e) => return reply(id, Err((codes::METHOD_NOT_FOUND, format!("{e}")))),
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.authorize(method, provided) {
        warn!("Rejected {}: {}", method, e);
        let body = RpcResponse::failure(id, e.rpc_code(), e.to_string());
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    let call = match DeployRequest::from_parts(method.as_str(), request.params) {
        Ok(call) => call,
        Err(e) => return reply(id, Err((e.code(), e.to_string()))),
    };

    debug!("{} {}", method, call.describe());
    match dispatch(&state.manager, call).await {
        Ok(result) => reply(id, Ok(result)),
        Err(e) => {
            log_failure(method, &e);
            reply(id, Err((e.rpc_code(), e.to_string())))
        }
    }
}

fn reply(id: Value, outcome: Result<Value, (i64, String)>) -> Response {
    let body = match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err((code, message)) => RpcResponse::failure(id, code, message),
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn log_failure(method: Method, err: &EngineError) {
    if err.rpc_code() == codes::INTERNAL_ERROR {
        error!("{} failed: {}", method, err);
    } else {
        warn!("{} rejected: {}", method, err);
    }
}
