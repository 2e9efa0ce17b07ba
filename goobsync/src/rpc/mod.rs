//! JSON-RPC transport
//!
//! The client side talks to the server only through [`Transport`], so a deploy
//! run can be pointed at the HTTP endpoint, an in-process server, or a test
//! double without touching the orchestration code.

use async_trait::async_trait;
use rpc_contract::DeployRequest;
use serde_json::Value;

use crate::errors::EngineError;

pub mod api;
pub mod client;
pub mod dispatch;

pub use api::DeployClient;
pub use client::HttpTransport;

/// Sends one typed request and yields the raw `result` member
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: DeployRequest) -> Result<Value, EngineError>;
}
