//! Typed JSON-RPC contract for the deployment sync engine.
//!
//! Both sides of the wire depend on this crate: the client builds
//! [`DeployRequest`] values and the server parses incoming envelopes back into
//! them, so a malformed call fails at the boundary instead of deep in a handler.

pub mod codes;
pub mod envelope;
pub mod models;
pub mod request;

pub use envelope::{RpcErrorObject, RpcRequest, RpcResponse, JSONRPC_VERSION};
pub use models::*;
pub use request::{DeployRequest, Method, RequestError};

/// Largest base64 payload sent in a single `uploadOneFile` request.
pub const REQUEST_SIZE_CEILING: usize = 80 * 1024;

/// Raw bytes per multipart chunk. Base64 expands by 4/3, so a chunk plus its
/// envelope stays under [`REQUEST_SIZE_CEILING`].
pub const CHUNK_SIZE: usize = REQUEST_SIZE_CEILING / 2;

/// Default number of files uploaded concurrently by one deploy run.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 50;

/// Path of the single JSON-RPC endpoint.
pub const RPC_PATH: &str = "/rpc";

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";
