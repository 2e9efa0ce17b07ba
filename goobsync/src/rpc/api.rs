//! Typed deployment API on top of a transport

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rpc_contract::{
    CreateDeploymentParams, CreateDeploymentResult, DeployNameParams, DeployRequest, FileEntry,
    FilePathParams, Method, UploadFilePartParams, UploadOneFileParams, VerifyResult,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::EngineError;
use crate::rpc::Transport;

/// Client for the deployment methods
#[derive(Clone)]
pub struct DeployClient {
    transport: Arc<dyn Transport>,
}

impl DeployClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Register a new deployment and get its server-issued name
    pub async fn create_deployment(
        &self,
        params: CreateDeploymentParams,
    ) -> Result<CreateDeploymentResult, EngineError> {
        let value = self
            .transport
            .call(DeployRequest::CreateDeployment(params))
            .await?;
        decode(Method::CreateDeployment, value)
    }

    /// Manifest entries the server has no matching content for
    pub async fn get_needed_files(&self, deploy_name: &str) -> Result<Vec<FileEntry>, EngineError> {
        let value = self
            .transport
            .call(DeployRequest::GetNeededFiles(name_params(deploy_name)))
            .await?;
        decode(Method::GetNeededFiles, value)
    }

    /// Send a whole file in one request
    pub async fn upload_one_file(
        &self,
        deploy_name: &str,
        rel_path: &str,
        content_base64: String,
    ) -> Result<(), EngineError> {
        self.transport
            .call(DeployRequest::UploadOneFile(UploadOneFileParams {
                deploy_name: deploy_name.to_string(),
                rel_path: rel_path.to_string(),
                content_base64,
            }))
            .await?;
        Ok(())
    }

    pub async fn start_multipart_upload(
        &self,
        deploy_name: &str,
        rel_path: &str,
    ) -> Result<(), EngineError> {
        self.transport
            .call(DeployRequest::StartMultiPartUpload(path_params(deploy_name, rel_path)))
            .await?;
        Ok(())
    }

    pub async fn upload_file_part(
        &self,
        deploy_name: &str,
        rel_path: &str,
        chunk_starts_at: u64,
        chunk: &[u8],
    ) -> Result<(), EngineError> {
        self.transport
            .call(DeployRequest::UploadFilePart(UploadFilePartParams {
                deploy_name: deploy_name.to_string(),
                rel_path: rel_path.to_string(),
                chunk_starts_at,
                chunk_base64: BASE64.encode(chunk),
            }))
            .await?;
        Ok(())
    }

    pub async fn finish_multipart_upload(
        &self,
        deploy_name: &str,
        rel_path: &str,
    ) -> Result<(), EngineError> {
        self.transport
            .call(DeployRequest::FinishMultiPartUpload(path_params(deploy_name, rel_path)))
            .await?;
        Ok(())
    }

    /// Tell the server no more uploads are coming
    pub async fn finish_uploads(&self, deploy_name: &str) -> Result<(), EngineError> {
        self.transport
            .call(DeployRequest::FinishUploads(name_params(deploy_name)))
            .await?;
        Ok(())
    }

    pub async fn verify_deployment(&self, deploy_name: &str) -> Result<VerifyResult, EngineError> {
        let value = self
            .transport
            .call(DeployRequest::VerifyDeployment(name_params(deploy_name)))
            .await?;
        decode(Method::VerifyDeployment, value)
    }

    pub async fn activate_deployment(&self, deploy_name: &str) -> Result<(), EngineError> {
        self.transport
            .call(DeployRequest::ActivateDeployment(name_params(deploy_name)))
            .await?;
        Ok(())
    }
}

fn name_params(deploy_name: &str) -> DeployNameParams {
    DeployNameParams {
        deploy_name: deploy_name.to_string(),
    }
}

fn path_params(deploy_name: &str, rel_path: &str) -> FilePathParams {
    FilePathParams {
        deploy_name: deploy_name.to_string(),
        rel_path: rel_path.to_string(),
    }
}

fn decode<T: DeserializeOwned>(method: Method, value: Value) -> Result<T, EngineError> {
    serde_json::from_value(value).map_err(|e| EngineError::Rpc {
        method: method.to_string(),
        detail: "result".to_string(),
        code: None,
        message: format!("unexpected result shape: {e}"),
    })
}
