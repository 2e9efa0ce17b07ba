//! Shared fixtures: an in-process server and a recording transport

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rpc_contract::{DeployRequest, Method};
use serde_json::Value;
use tempfile::TempDir;

use goobsync::client::Deployer;
use goobsync::deploy::DeploymentManager;
use goobsync::errors::EngineError;
use goobsync::filesys::dir::Dir;
use goobsync::rpc::dispatch::dispatch;
use goobsync::rpc::Transport;
use goobsync::storage::layout::ServerLayout;
use goobsync::storage::settings::DeploySettings;

/// A server engine rooted in a temp dir
pub struct TestServer {
    pub data: TempDir,
    pub manager: Arc<DeploymentManager>,
}

impl TestServer {
    pub async fn new() -> Self {
        let data = tempfile::tempdir().unwrap();
        let layout = ServerLayout::new(data.path());
        let manager = Arc::new(DeploymentManager::open(&layout).await.unwrap());
        Self { data, manager }
    }

    /// Files of the project's active deployment, relative to its directory
    pub async fn active_files(&self, project: &str) -> Vec<(String, Vec<u8>)> {
        let name = self
            .manager
            .registry()
            .get_active(project)
            .unwrap()
            .expect("project has an active deployment");
        self.deployment_files(&name).await
    }

    pub async fn deployment_files(&self, deploy_name: &str) -> Vec<(String, Vec<u8>)> {
        let record = self.manager.get_deployment(deploy_name).unwrap();
        let dir = Dir::new(self.manager.content_dir(&record).unwrap());
        let mut files = Vec::new();
        for rel in dir.walk_files().await.unwrap() {
            let bytes = dir.file(&rel).read_bytes().await.unwrap();
            files.push((rel, bytes));
        }
        files
    }
}

/// Calls the manager directly and remembers every request it saw
pub struct RecordingTransport {
    manager: Option<Arc<DeploymentManager>>,
    calls: Mutex<Vec<DeployRequest>>,
    fail_uploads_of: Vec<String>,
}

impl RecordingTransport {
    pub fn new(manager: Arc<DeploymentManager>) -> Self {
        Self {
            manager: Some(manager),
            calls: Mutex::new(Vec::new()),
            fail_uploads_of: Vec::new(),
        }
    }

    /// A transport with no server behind it; every call fails
    pub fn disconnected() -> Self {
        Self {
            manager: None,
            calls: Mutex::new(Vec::new()),
            fail_uploads_of: Vec::new(),
        }
    }

    /// Fail every upload call touching `rel_path`
    pub fn failing_uploads_of(mut self, rel_path: &str) -> Self {
        self.fail_uploads_of.push(rel_path.to_string());
        self
    }

    pub fn calls(&self) -> Vec<DeployRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.calls().iter().map(DeployRequest::method).collect()
    }

    /// Paths sent through either upload mode
    pub fn uploaded_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeployRequest::UploadOneFile(p) => Some(p.rel_path),
                DeployRequest::StartMultiPartUpload(p) => Some(p.rel_path),
                _ => None,
            })
            .collect();
        paths.sort();
        paths
    }
}

fn upload_path(request: &DeployRequest) -> Option<&str> {
    match request {
        DeployRequest::UploadOneFile(p) => Some(&p.rel_path),
        DeployRequest::StartMultiPartUpload(p) | DeployRequest::FinishMultiPartUpload(p) => {
            Some(&p.rel_path)
        }
        DeployRequest::UploadFilePart(p) => Some(&p.rel_path),
        _ => None,
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn call(&self, request: DeployRequest) -> Result<Value, EngineError> {
        self.calls.lock().unwrap().push(request.clone());

        if let Some(path) = upload_path(&request) {
            if self.fail_uploads_of.iter().any(|p| p == path) {
                return Err(EngineError::Rpc {
                    method: request.method().to_string(),
                    detail: request.describe(),
                    code: None,
                    message: "connection reset".to_string(),
                });
            }
        }

        match &self.manager {
            Some(manager) => dispatch(manager, request).await,
            None => Err(EngineError::ServerError("no server".to_string())),
        }
    }
}

pub fn settings(project: &str) -> DeploySettings {
    DeploySettings::from_text(&format!(
        r#"{{"project-name": "{project}", "dest-url": "http://127.0.0.1:7420"}}"#
    ))
    .unwrap()
}

/// A project directory holding `files`
pub async fn project(files: &[(&str, &[u8])]) -> (TempDir, Dir) {
    let tmp = tempfile::tempdir().unwrap();
    let dir = Dir::new(tmp.path());
    for (rel, content) in files {
        dir.file(rel).write_bytes(content).await.unwrap();
    }
    (tmp, dir)
}

pub fn deployer(transport: Arc<RecordingTransport>, settings: DeploySettings) -> Deployer {
    Deployer::new(transport, settings, "{}")
}

pub const BASIC_APP: &[(&str, &[u8])] = &[
    ("package.json", br#"{"name": "basic-app", "main": "index.js"}"#),
    ("index.js", b"console.log('hello');\n"),
    ("public/index.html", b"<!doctype html><h1>basic-app</h1>\n"),
];

/// Deterministic pseudo-random bytes
pub fn payload(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect()
}
