//! Client side of a deploy: orchestration over the transport

pub mod deploy;
pub mod orchestrator;

pub use deploy::{DeployOutcome, Deployer};
pub use orchestrator::{FailedUpload, UploadMode, UploadOrchestrator, UploadReport};
