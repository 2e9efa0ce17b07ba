//! HTTP transport implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rpc_contract::{DeployRequest, RpcRequest, RpcResponse, API_KEY_HEADER};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::errors::EngineError;
use crate::rpc::Transport;

/// JSON-RPC over HTTP POST to a single endpoint
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    api_key: Option<SecretString>,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a new transport
    pub fn new(endpoint: Url, api_key: Option<SecretString>) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            next_id: AtomicU64::new(1),
        })
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: DeployRequest) -> Result<Value, EngineError> {
        let method = request.method();
        let detail = request.describe();
        let failed = |code: Option<i64>, message: String| EngineError::Rpc {
            method: method.to_string(),
            detail: detail.clone(),
            code,
            message,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = RpcRequest::new(method.as_str(), request.params()?, id);
        debug!("POST {} {} ({})", self.endpoint, method, detail);

        let mut builder = self.client.post(self.endpoint.clone()).json(&envelope);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| failed(None, e.to_string()))?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("RPC {} failed: {} - {}", method, status, body);
            let code = serde_json::from_str::<RpcResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.code);
            return Err(failed(code, format!("HTTP {}: {}", status, body)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| failed(None, format!("malformed response: {e}")))?;

        if let Some(err) = body.error {
            error!("RPC {} returned error {}: {}", method, err.code, err.message);
            return Err(failed(Some(err.code), err.message));
        }

        Ok(body.result.unwrap_or(Value::Null))
    }
}
