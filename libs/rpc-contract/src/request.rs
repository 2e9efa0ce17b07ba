//! Method names and the request sum type

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::codes;
use crate::models::{
    CreateDeploymentParams, DeployNameParams, FilePathParams, UploadFilePartParams,
    UploadOneFileParams,
};

/// Every method the deployment endpoint understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    CreateDeployment,
    GetNeededFiles,
    UploadOneFile,
    StartMultiPartUpload,
    UploadFilePart,
    FinishMultiPartUpload,
    FinishUploads,
    VerifyDeployment,
    ActivateDeployment,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::CreateDeployment,
        Method::GetNeededFiles,
        Method::UploadOneFile,
        Method::StartMultiPartUpload,
        Method::UploadFilePart,
        Method::FinishMultiPartUpload,
        Method::FinishUploads,
        Method::VerifyDeployment,
        Method::ActivateDeployment,
    ];

    /// Wire name, case-sensitive
    pub fn as_str(self) -> &'static str {
        match self {
            Method::CreateDeployment => "createDeployment",
            Method::GetNeededFiles => "getNeededFiles",
            Method::UploadOneFile => "uploadOneFile",
            Method::StartMultiPartUpload => "startMultiPartUpload",
            Method::UploadFilePart => "uploadFilePart",
            Method::FinishMultiPartUpload => "finishMultiPartUpload",
            Method::FinishUploads => "finishUploads",
            Method::VerifyDeployment => "verifyDeployment",
            Method::ActivateDeployment => "activateDeployment",
        }
    }

    /// Methods that need the API key: everything except `getNeededFiles`,
    /// which is idempotent (it only fills the deployment with content its
    /// manifest already names, and repeating it changes nothing)
    pub fn is_privileged(self) -> bool {
        !matches!(self, Method::GetNeededFiles)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| RequestError::UnknownMethod(s.to_string()))
    }
}

/// Failure to turn a wire envelope into a [`DeployRequest`]
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params for {method}: {source}")]
    InvalidParams {
        method: Method,
        #[source]
        source: serde_json::Error,
    },
}

impl RequestError {
    pub fn code(&self) -> i64 {
        match self {
            RequestError::UnknownMethod(_) => codes::METHOD_NOT_FOUND,
            RequestError::InvalidParams { .. } => codes::INVALID_PARAMS,
        }
    }
}

/// A typed call: one variant per method, carrying that method's params
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployRequest {
    CreateDeployment(CreateDeploymentParams),
    GetNeededFiles(DeployNameParams),
    UploadOneFile(UploadOneFileParams),
    StartMultiPartUpload(FilePathParams),
    UploadFilePart(UploadFilePartParams),
    FinishMultiPartUpload(FilePathParams),
    FinishUploads(DeployNameParams),
    VerifyDeployment(DeployNameParams),
    ActivateDeployment(DeployNameParams),
}

impl DeployRequest {
    pub fn method(&self) -> Method {
        match self {
            DeployRequest::CreateDeployment(_) => Method::CreateDeployment,
            DeployRequest::GetNeededFiles(_) => Method::GetNeededFiles,
            DeployRequest::UploadOneFile(_) => Method::UploadOneFile,
            DeployRequest::StartMultiPartUpload(_) => Method::StartMultiPartUpload,
            DeployRequest::UploadFilePart(_) => Method::UploadFilePart,
            DeployRequest::FinishMultiPartUpload(_) => Method::FinishMultiPartUpload,
            DeployRequest::FinishUploads(_) => Method::FinishUploads,
            DeployRequest::VerifyDeployment(_) => Method::VerifyDeployment,
            DeployRequest::ActivateDeployment(_) => Method::ActivateDeployment,
        }
    }

    /// Serialize the params member of the envelope
    pub fn params(&self) -> Result<Value, serde_json::Error> {
        match self {
            DeployRequest::CreateDeployment(p) => serde_json::to_value(p),
            DeployRequest::UploadOneFile(p) => serde_json::to_value(p),
            DeployRequest::UploadFilePart(p) => serde_json::to_value(p),
            DeployRequest::StartMultiPartUpload(p) | DeployRequest::FinishMultiPartUpload(p) => {
                serde_json::to_value(p)
            }
            DeployRequest::GetNeededFiles(p)
            | DeployRequest::FinishUploads(p)
            | DeployRequest::VerifyDeployment(p)
            | DeployRequest::ActivateDeployment(p) => serde_json::to_value(p),
        }
    }

    /// Parse a method name and its raw params
    pub fn from_parts(method: &str, params: Value) -> Result<Self, RequestError> {
        let method: Method = method.parse()?;
        let request = match method {
            Method::CreateDeployment => DeployRequest::CreateDeployment(decode(method, params)?),
            Method::GetNeededFiles => DeployRequest::GetNeededFiles(decode(method, params)?),
            Method::UploadOneFile => DeployRequest::UploadOneFile(decode(method, params)?),
            Method::StartMultiPartUpload => {
                DeployRequest::StartMultiPartUpload(decode(method, params)?)
            }
            Method::UploadFilePart => DeployRequest::UploadFilePart(decode(method, params)?),
            Method::FinishMultiPartUpload => {
                DeployRequest::FinishMultiPartUpload(decode(method, params)?)
            }
            Method::FinishUploads => DeployRequest::FinishUploads(decode(method, params)?),
            Method::VerifyDeployment => DeployRequest::VerifyDeployment(decode(method, params)?),
            Method::ActivateDeployment => {
                DeployRequest::ActivateDeployment(decode(method, params)?)
            }
        };
        Ok(request)
    }

    /// Short, payload-free description used in error messages
    pub fn describe(&self) -> String {
        match self {
            DeployRequest::CreateDeployment(p) => format!(
                "projectName={} files={}",
                p.project_name,
                p.source_file_manifest.len()
            ),
            DeployRequest::UploadOneFile(p) => format!(
                "deployName={} relPath={} bytes(b64)={}",
                p.deploy_name,
                p.rel_path,
                p.content_base64.len()
            ),
            DeployRequest::UploadFilePart(p) => format!(
                "deployName={} relPath={} chunkStartsAt={}",
                p.deploy_name, p.rel_path, p.chunk_starts_at
            ),
            DeployRequest::StartMultiPartUpload(p) | DeployRequest::FinishMultiPartUpload(p) => {
                format!("deployName={} relPath={}", p.deploy_name, p.rel_path)
            }
            DeployRequest::GetNeededFiles(p)
            | DeployRequest::FinishUploads(p)
            | DeployRequest::VerifyDeployment(p)
            | DeployRequest::ActivateDeployment(p) => format!("deployName={}", p.deploy_name),
        }
    }
}

fn decode<T: DeserializeOwned>(method: Method, params: Value) -> Result<T, RequestError> {
    serde_json::from_value(params).map_err(|source| RequestError::InvalidParams { method, source })
}
