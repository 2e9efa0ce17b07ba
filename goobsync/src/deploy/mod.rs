//! Server-side deployment engine

pub mod fsm;
pub mod manager;
pub mod registry;
pub mod store;
pub mod upload;

pub use manager::DeploymentManager;
pub use registry::ActiveDeploymentRegistry;
