//! HTTP server setup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::EngineError;
use crate::server::handlers::{health_handler, rpc_handler};
use crate::server::state::ServerState;

/// Routes of the deployment server
pub fn router(state: Arc<ServerState>, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(rpc_contract::RPC_PATH, post(rpc_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_request_bytes)),
        )
}

/// Bind to the configured address and start serving
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, JoinHandle<Result<(), EngineError>>), EngineError> {
    let addr = format!("{}:{}", options.host, options.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| EngineError::ServerError(format!("bind {addr}: {e}")))?;

    serve_with_listener(
        listener,
        router(state, options.max_request_bytes),
        shutdown_signal,
    )
}

/// Serve `app` on an already bound listener
pub fn serve_with_listener(
    listener: TcpListener,
    app: Router,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, JoinHandle<Result<(), EngineError>>), EngineError> {
    let local_addr = listener.local_addr()?;
    info!("Starting HTTP server on {}", local_addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| EngineError::ServerError(e.to_string()))
    });

    Ok((local_addr, handle))
}
