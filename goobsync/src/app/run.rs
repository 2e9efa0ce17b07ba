//! Server run loop

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use crate::app::options::ServerOptions;
use crate::deploy::DeploymentManager;
use crate::errors::EngineError;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the deployment server until `shutdown_signal` resolves
pub async fn run_server(
    mut options: ServerOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), EngineError> {
    info!("Initializing deployment server...");
    info!("Data directory: {}", options.layout.base_dir.display());

    let manager = Arc::new(DeploymentManager::open(&options.layout).await?);
    let api_key = options.api_key.take();
    if api_key.is_none() && options.skip_auth {
        info!("No api key configured; privileged methods are open");
    }
    let state = Arc::new(ServerState::new(manager, api_key, options.skip_auth));

    let (addr, handle) = serve(&options, state, shutdown_signal).await?;
    info!("Deployment server listening on http://{}{}", addr, rpc_contract::RPC_PATH);

    match handle.await {
        Ok(result) => {
            info!("Deployment server stopped");
            result
        }
        Err(e) => {
            error!("Server task failed: {}", e);
            Err(EngineError::ServerError(e.to_string()))
        }
    }
}
