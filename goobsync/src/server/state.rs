//! Server state

use std::sync::Arc;

use rpc_contract::Method;
use secrecy::{ExposeSecret, SecretString};

use crate::deploy::DeploymentManager;
use crate::errors::EngineError;
use crate::utils::sha256_hash;

/// Server state shared across handlers
pub struct ServerState {
    pub manager: Arc<DeploymentManager>,
    api_key: Option<SecretString>,
    skip_auth: bool,
}

impl ServerState {
    pub fn new(
        manager: Arc<DeploymentManager>,
        api_key: Option<SecretString>,
        skip_auth: bool,
    ) -> Self {
        Self {
            manager,
            api_key,
            skip_auth,
        }
    }

    /// Check the `x-api-key` value for `method`. Idempotent methods are open.
    /// With no key configured, privileged calls pass only if `skip_auth` is set.
    pub fn authorize(&self, method: Method, provided: Option<&str>) -> Result<(), EngineError> {
        if !method.is_privileged() {
            return Ok(());
        }

        let Some(expected) = &self.api_key else {
            if self.skip_auth {
                return Ok(());
            }
            return Err(EngineError::AuthError(
                "server has no api key configured".to_string(),
            ));
        };

        let Some(provided) = provided else {
            return Err(EngineError::AuthError(format!("{method} requires an api key")));
        };

        // Compare digests so the comparison time does not depend on the key
        if sha256_hash(provided.as_bytes()) != sha256_hash(expected.expose_secret().as_bytes()) {
            return Err(EngineError::AuthError("invalid api key".to_string()));
        }
        Ok(())
    }
}
