//! JSON-RPC HTTP server

pub mod handlers;
pub mod serve;
pub mod state;

pub use serve::{router, serve, serve_with_listener};
pub use state::ServerState;
