//! Finite State Machine for a deployment's lifecycle

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// Registered, no content received yet
    Created,

    /// At least one file upload has started
    Uploading,

    /// Client declared uploads finished; awaiting verification
    Verifying,

    /// Every manifest entry is present with a matching hash
    Verified,

    /// Live deployment of its project
    Active,

    /// Verification failed. Terminal.
    Failed,

    /// Was active until a later activation replaced it; can be re-activated
    Superseded,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Created => "created",
            DeploymentState::Uploading => "uploading",
            DeploymentState::Verifying => "verifying",
            DeploymentState::Verified => "verified",
            DeploymentState::Active => "active",
            DeploymentState::Failed => "failed",
            DeploymentState::Superseded => "superseded",
        }
    }

    /// Uploads and needed-file queries are accepted
    pub fn accepts_uploads(&self) -> bool {
        matches!(self, DeploymentState::Created | DeploymentState::Uploading)
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(DeploymentState::Created),
            "uploading" => Ok(DeploymentState::Uploading),
            "verifying" => Ok(DeploymentState::Verifying),
            "verified" => Ok(DeploymentState::Verified),
            "active" => Ok(DeploymentState::Active),
            "failed" => Ok(DeploymentState::Failed),
            "superseded" => Ok(DeploymentState::Superseded),
            other => Err(format!("Unknown deployment state: {}", other)),
        }
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// A file upload began
    UploadStarted,

    /// Client called finishUploads
    UploadsFinished,

    /// Verification passed
    VerifySucceeded,

    /// Verification failed
    VerifyFailed(String),

    /// Became the project's active deployment
    Activate,

    /// Another deployment of the project was activated
    Supersede,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in created state
    pub fn new() -> Self {
        Self::from_state(DeploymentState::Created)
    }

    /// Resume an FSM from a persisted state
    pub fn from_state(state: DeploymentState) -> Self {
        Self { state, error: None }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentState, String> {
        use DeploymentState::*;

        let new_state = match (&self.state, &event) {
            (Created | Uploading, DeploymentEvent::UploadStarted) => Uploading,
            (Created | Uploading, DeploymentEvent::UploadsFinished) => Verifying,
            (Verifying, DeploymentEvent::UploadsFinished) => Verifying,

            (Verifying | Verified, DeploymentEvent::VerifySucceeded) => Verified,
            (Verifying | Verified, DeploymentEvent::VerifyFailed(err)) => {
                self.error = Some(err.clone());
                Failed
            }

            // Active re-activates as a no-op; superseded re-activates on rollback
            (Verified | Active | Superseded, DeploymentEvent::Activate) => Active,
            (Active, DeploymentEvent::Supersede) => Superseded,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
