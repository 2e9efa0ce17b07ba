//! Params and results of every deployment method

use serde::{Deserialize, Serialize};

/// One manifest entry: a project-relative posix path and its content hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub rel_path: String,
    pub sha: String,
}

impl FileEntry {
    pub fn new(rel_path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            sha: sha.into(),
        }
    }
}

/// `createDeployment` params
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentParams {
    pub project_name: String,
    pub source_file_manifest: Vec<FileEntry>,
    pub source_file_config: String,

    /// Directory inside the deployment that holds the web assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_static_dir: Option<String>,

    /// Reuse one directory for every deployment of the project
    #[serde(default)]
    pub update_in_place: bool,
}

/// `createDeployment` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentResult {
    pub deploy_name: String,
}

/// Params of the methods that only name a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployNameParams {
    pub deploy_name: String,
}

/// `uploadOneFile` params
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOneFileParams {
    pub deploy_name: String,
    pub rel_path: String,
    pub content_base64: String,
}

/// `startMultiPartUpload` / `finishMultiPartUpload` params
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePathParams {
    pub deploy_name: String,
    pub rel_path: String,
}

/// `uploadFilePart` params
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFilePartParams {
    pub deploy_name: String,
    pub rel_path: String,
    pub chunk_starts_at: u64,
    pub chunk_base64: String,
}

/// Outcome of `verifyDeployment`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Success,
    Error,
}

/// `verifyDeployment` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub status: VerifyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResult {
    pub fn success() -> Self {
        Self {
            status: VerifyStatus::Success,
            error: None,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            status: VerifyStatus::Error,
            error: Some(description.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == VerifyStatus::Success
    }
}
