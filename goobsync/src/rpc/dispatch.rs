//! Server-side routing of typed requests to the deployment manager

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rpc_contract::DeployRequest;
use serde_json::Value;

use crate::deploy::DeploymentManager;
use crate::errors::EngineError;

/// Execute one request and produce the JSON `result` member
pub async fn dispatch(
    manager: &DeploymentManager,
    request: DeployRequest,
) -> Result<Value, EngineError> {
    let value = match request {
        DeployRequest::CreateDeployment(p) => {
            serde_json::to_value(manager.create_deployment(p).await?)?
        }
        DeployRequest::GetNeededFiles(p) => {
            serde_json::to_value(manager.get_needed_files(&p.deploy_name).await?)?
        }
        DeployRequest::UploadOneFile(p) => {
            let content = decode_base64("contentBase64", &p.content_base64)?;
            manager
                .upload_one_file(&p.deploy_name, &p.rel_path, &content)
                .await?;
            Value::Null
        }
        DeployRequest::StartMultiPartUpload(p) => {
            manager
                .start_multipart_upload(&p.deploy_name, &p.rel_path)
                .await?;
            Value::Null
        }
        DeployRequest::UploadFilePart(p) => {
            let chunk = decode_base64("chunkBase64", &p.chunk_base64)?;
            manager
                .upload_file_part(&p.deploy_name, &p.rel_path, p.chunk_starts_at, &chunk)
                .await?;
            Value::Null
        }
        DeployRequest::FinishMultiPartUpload(p) => {
            manager
                .finish_multipart_upload(&p.deploy_name, &p.rel_path)
                .await?;
            Value::Null
        }
        DeployRequest::FinishUploads(p) => {
            manager.finish_uploads(&p.deploy_name).await?;
            Value::Null
        }
        DeployRequest::VerifyDeployment(p) => {
            serde_json::to_value(manager.verify_deployment(&p.deploy_name).await?)?
        }
        DeployRequest::ActivateDeployment(p) => {
            manager.activate_deployment(&p.deploy_name).await?;
            Value::Null
        }
    };
    Ok(value)
}

fn decode_base64(field: &str, encoded: &str) -> Result<Vec<u8>, EngineError> {
    BASE64
        .decode(encoded)
        .map_err(|e| EngineError::InvalidParams(format!("{field}: {e}")))
}
