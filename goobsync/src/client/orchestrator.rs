//! Bounded-concurrency upload of a deployment's needed files
//!
//! Every file is one unit of work behind a semaphore. A multipart file runs
//! its start, parts and finish sequentially inside its own task; different
//! files run in parallel. The join waits for every task to settle and
//! records failures instead of aborting the batch.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::future::join_all;
use rpc_contract::{FileEntry, CHUNK_SIZE, REQUEST_SIZE_CEILING};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::filesys::paths::resolve_within;
use crate::rpc::DeployClient;

/// How one file travels to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Single,
    Multipart { parts: usize },
}

impl UploadMode {
    /// Single-shot when the base64 form stays below the request ceiling
    pub fn for_len(len: usize) -> Self {
        if base64_len(len) < REQUEST_SIZE_CEILING {
            UploadMode::Single
        } else {
            UploadMode::Multipart {
                parts: len.div_ceil(CHUNK_SIZE),
            }
        }
    }
}

fn base64_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub rel_path: String,
    pub error: String,
}

/// Outcome of an upload batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<FailedUpload>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Uploads files for one deployment
#[derive(Clone)]
pub struct UploadOrchestrator {
    client: DeployClient,
    concurrency: usize,
}

impl UploadOrchestrator {
    pub fn new(client: DeployClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Send one file, single-shot or as ordered parts
    pub async fn upload_file(
        &self,
        deploy_name: &str,
        rel_path: &str,
        bytes: &[u8],
    ) -> Result<UploadMode, EngineError> {
        let mode = UploadMode::for_len(bytes.len());
        match mode {
            UploadMode::Single => {
                self.client
                    .upload_one_file(deploy_name, rel_path, BASE64.encode(bytes))
                    .await?;
                debug!("Uploaded {} ({} bytes)", rel_path, bytes.len());
            }
            UploadMode::Multipart { parts } => {
                self.client.start_multipart_upload(deploy_name, rel_path).await?;
                for (index, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
                    let offset = (index * CHUNK_SIZE) as u64;
                    self.client
                        .upload_file_part(deploy_name, rel_path, offset, chunk)
                        .await?;
                }
                self.client.finish_multipart_upload(deploy_name, rel_path).await?;
                debug!("Uploaded {} ({} bytes in {} parts)", rel_path, bytes.len(), parts);
            }
        }
        Ok(mode)
    }

    /// Upload every needed file found under `root`, waiting for all of them
    /// to settle
    pub async fn upload_all(
        &self,
        deploy_name: &str,
        root: &Dir,
        needed: &[FileEntry],
    ) -> UploadReport {
        info!(
            "Uploading {} files to {} (concurrency {})",
            needed.len(),
            deploy_name,
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut rel_paths = Vec::with_capacity(needed.len());
        let mut handles = Vec::with_capacity(needed.len());

        for entry in needed {
            let sem = Arc::clone(&semaphore);
            let this = self.clone();
            let deploy_name = deploy_name.to_string();
            let rel_path = entry.rel_path.clone();
            let source = resolve_within(root.path(), &entry.rel_path).map(File::new);

            let handle = tokio::spawn(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|e| EngineError::Internal(e.to_string()))?;
                let bytes = source?.read_bytes().await?;
                this.upload_file(&deploy_name, &rel_path, &bytes).await
            });
            rel_paths.push(entry.rel_path.clone());
            handles.push(handle);
        }

        let settled = join_all(handles).await;
        let mut report = UploadReport::default();
        for (rel_path, joined) in rel_paths.into_iter().zip(settled) {
            let outcome = match joined {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("upload task failed: {e}")),
            };
            match outcome {
                Ok(_) => report.uploaded.push(rel_path),
                Err(error) => {
                    warn!("Upload of {} failed: {}", rel_path, error);
                    report.failed.push(FailedUpload { rel_path, error });
                }
            }
        }

        info!(
            "Uploads settled: {} succeeded, {} failed",
            report.uploaded.len(),
            report.failed.len()
        );
        report
    }
}
