//! Error types for the deployment sync engine

use rpc_contract::codes;
use thiserror::Error;

/// Main error type for client and server sides of the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Refusing to deploy files that look like secrets: {}", paths.join(", "))]
    Security { paths: Vec<String> },

    #[error("Path escapes its root: {path}")]
    PathTraversal { path: String },

    #[error("RPC {method} failed ({detail}): {message}")]
    Rpc {
        method: String,
        detail: String,
        code: Option<i64>,
        message: String,
    },

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Deployment {deploy_name} is {state}, cannot {action}")]
    InvalidState {
        deploy_name: String,
        state: String,
        action: String,
    },

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// JSON-RPC error code reported when this error crosses the wire
    pub fn rpc_code(&self) -> i64 {
        match self {
            EngineError::Security { .. } => codes::SECURITY,
            EngineError::PathTraversal { .. } => codes::PATH_TRAVERSAL,
            EngineError::Rpc { code, .. } => code.unwrap_or(codes::INTERNAL_ERROR),
            EngineError::Verification(_) => codes::VERIFICATION_FAILED,
            EngineError::InvalidState { .. } => codes::INVALID_STATE,
            EngineError::InvalidParams(_) => codes::INVALID_PARAMS,
            EngineError::AuthError(_) => codes::UNAUTHORIZED,
            EngineError::ValidationError(_) => codes::VALIDATION,
            EngineError::NotFound(_) => codes::NOT_FOUND,
            EngineError::IoError(_)
            | EngineError::JsonError(_)
            | EngineError::HttpError(_)
            | EngineError::DatabaseError(_)
            | EngineError::ConfigError(_)
            | EngineError::ServerError(_)
            | EngineError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    pub fn traversal(path: impl Into<String>) -> Self {
        EngineError::PathTraversal { path: path.into() }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<rpc_contract::RequestError> for EngineError {
    fn from(err: rpc_contract::RequestError) -> Self {
        EngineError::InvalidParams(err.to_string())
    }
}
