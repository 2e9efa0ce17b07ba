//! goobsync library
//!
//! Deployment sync engine: a client that pushes a project's file tree to a
//! server over JSON-RPC, and the server that stores, verifies and activates
//! deployments.

pub mod app;
pub mod client;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod manifest;
pub mod rpc;
pub mod server;
pub mod storage;
pub mod utils;
