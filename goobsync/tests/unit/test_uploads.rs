//! Single-shot and multipart uploads

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use goobsync::client::{UploadMode, UploadOrchestrator};
use goobsync::errors::EngineError;
use goobsync::rpc::{DeployClient, Transport};
use goobsync::utils::sha256_hash;
use rpc_contract::{CreateDeploymentParams, DeployRequest, FileEntry, Method, CHUNK_SIZE};
use serde_json::Value;

use crate::support::{deployer, payload, project, settings, RecordingTransport, TestServer};

async fn create(client: &DeployClient, project: &str, files: &[(&str, &[u8])]) -> String {
    client
        .create_deployment(CreateDeploymentParams {
            project_name: project.to_string(),
            source_file_manifest: files
                .iter()
                .map(|(rel, content)| FileEntry::new(*rel, sha256_hash(content)))
                .collect(),
            source_file_config: "{}".to_string(),
            web_static_dir: None,
            update_in_place: false,
        })
        .await
        .unwrap()
        .deploy_name
}

async fn upload_chunked(client: &DeployClient, deploy_name: &str, rel: &str, content: &[u8]) {
    client.start_multipart_upload(deploy_name, rel).await.unwrap();
    for (i, chunk) in content.chunks(CHUNK_SIZE).enumerate() {
        client
            .upload_file_part(deploy_name, rel, (i * CHUNK_SIZE) as u64, chunk)
            .await
            .unwrap();
    }
    client.finish_multipart_upload(deploy_name, rel).await.unwrap();
}

#[tokio::test]
async fn test_both_upload_modes_store_identical_bytes() {
    let server = TestServer::new().await;
    let client = DeployClient::new(Arc::new(RecordingTransport::new(server.manager.clone())));

    for (i, content) in [
        Vec::new(),
        payload(1, 1),
        payload(10_000, 2),
        payload(CHUNK_SIZE, 3),
        payload(200_000, 4),
    ]
    .iter()
    .enumerate()
    {
        let files: &[(&str, &[u8])] = &[("data/blob.bin", content.as_slice())];
        let single = create(&client, &format!("single-{i}"), files).await;
        let chunked = create(&client, &format!("chunked-{i}"), files).await;

        client
            .upload_one_file(&single, "data/blob.bin", BASE64.encode(content))
            .await
            .unwrap();
        upload_chunked(&client, &chunked, "data/blob.bin", content).await;

        let single_files = server.deployment_files(&single).await;
        let chunked_files = server.deployment_files(&chunked).await;
        assert_eq!(single_files, chunked_files, "payload {i}");
        assert_eq!(single_files[0].1, *content);
    }
}

#[tokio::test]
async fn test_orchestrator_picks_mode_by_encoded_size() {
    let server = TestServer::new().await;
    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let client = DeployClient::new(transport.clone());
    let small = payload(60_000, 5);
    let large = payload(150_000, 6);
    let name = create(
        &client,
        "modes",
        &[("small.bin", small.as_slice()), ("large.bin", large.as_slice())],
    )
    .await;

    let orchestrator = UploadOrchestrator::new(client, 4);
    assert_eq!(
        orchestrator.upload_file(&name, "small.bin", &small).await.unwrap(),
        UploadMode::Single
    );
    assert_eq!(
        orchestrator.upload_file(&name, "large.bin", &large).await.unwrap(),
        UploadMode::Multipart { parts: 4 }
    );

    let methods: Vec<Method> = transport.methods().into_iter().skip(1).collect();
    assert_eq!(
        methods,
        vec![
            Method::UploadOneFile,
            Method::StartMultiPartUpload,
            Method::UploadFilePart,
            Method::UploadFilePart,
            Method::UploadFilePart,
            Method::UploadFilePart,
            Method::FinishMultiPartUpload,
        ]
    );
}

#[tokio::test]
async fn test_parts_of_one_file_arrive_in_ascending_order() {
    let server = TestServer::new().await;
    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let mut files: Vec<(String, Vec<u8>)> = (0..6)
        .map(|i| (format!("assets/chunk-{i}.bin"), payload(100_000 + i * 7_000, i as u32)))
        .collect();
    files.push(("index.js".to_string(), b"1".to_vec()));
    let borrowed: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(rel, content)| (rel.as_str(), content.as_slice()))
        .collect();
    let (_tmp, root) = project(&borrowed).await;

    let outcome = deployer(transport.clone(), settings("big"))
        .deploy(&root)
        .await
        .unwrap();
    assert_eq!(outcome.report.uploaded.len(), 7);

    for (rel, content) in &files[..6] {
        let offsets: Vec<u64> = transport
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeployRequest::UploadFilePart(p) if &p.rel_path == rel => Some(p.chunk_starts_at),
                _ => None,
            })
            .collect();
        let expected: Vec<u64> = (0..content.len().div_ceil(CHUNK_SIZE))
            .map(|i| (i * CHUNK_SIZE) as u64)
            .collect();
        assert_eq!(offsets, expected, "{rel}");
    }
    assert_eq!(server.active_files("big").await.len(), 7);
}

#[tokio::test]
async fn test_out_of_order_part_is_rejected() {
    let server = TestServer::new().await;
    let client = DeployClient::new(Arc::new(RecordingTransport::new(server.manager.clone())));
    let content = payload(3 * CHUNK_SIZE, 9);
    let name = create(&client, "ordering", &[("big.bin", content.as_slice())]).await;
    let chunks: Vec<&[u8]> = content.chunks(CHUNK_SIZE).collect();

    client.start_multipart_upload(&name, "big.bin").await.unwrap();
    let err = client
        .upload_file_part(&name, "big.bin", CHUNK_SIZE as u64, chunks[1])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParams(_)), "{err}");

    client.upload_file_part(&name, "big.bin", 0, chunks[0]).await.unwrap();
    let err = client
        .upload_file_part(&name, "big.bin", 2 * CHUNK_SIZE as u64, chunks[2])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParams(_)));

    client
        .upload_file_part(&name, "big.bin", CHUNK_SIZE as u64, chunks[1])
        .await
        .unwrap();
    client
        .upload_file_part(&name, "big.bin", 2 * CHUNK_SIZE as u64, chunks[2])
        .await
        .unwrap();
    client.finish_multipart_upload(&name, "big.bin").await.unwrap();

    assert_eq!(server.deployment_files(&name).await[0].1, content);
}

#[tokio::test]
async fn test_incomplete_multipart_is_not_stored() {
    let server = TestServer::new().await;
    let client = DeployClient::new(Arc::new(RecordingTransport::new(server.manager.clone())));
    let content = payload(2 * CHUNK_SIZE + 10, 11);
    let name = create(&client, "partial", &[("big.bin", content.as_slice())]).await;

    client.start_multipart_upload(&name, "big.bin").await.unwrap();
    client
        .upload_file_part(&name, "big.bin", 0, &content[..CHUNK_SIZE])
        .await
        .unwrap();
    let err = client.finish_multipart_upload(&name, "big.bin").await.unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)), "{err}");

    assert!(server.deployment_files(&name).await.is_empty());
    assert!(server.data.path().join("uploads").read_dir().unwrap().next().is_none());
}

#[tokio::test]
async fn test_upload_paths_cannot_escape_deploy_dir() {
    let server = TestServer::new().await;
    let manager = &server.manager;
    let client = DeployClient::new(Arc::new(RecordingTransport::new(manager.clone())));
    let name = create(&client, "escape", &[("index.js", b"1")]).await;

    for bad in ["../../etc/passwd", "/etc/passwd", "public/../../x", "..\\x"] {
        let err = manager.upload_one_file(&name, bad, b"1").await.unwrap_err();
        assert!(matches!(err, EngineError::PathTraversal { .. }), "{bad}: {err}");

        let err = manager.start_multipart_upload(&name, bad).await.unwrap_err();
        assert!(matches!(err, EngineError::PathTraversal { .. }), "{bad}: {err}");
    }

    let err = client
        .create_deployment(CreateDeploymentParams {
            project_name: "escape".to_string(),
            source_file_manifest: vec![FileEntry::new("a/../../b.js", sha256_hash(b"x"))],
            source_file_config: "{}".to_string(),
            web_static_dir: None,
            update_in_place: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PathTraversal { .. }));

    let err = client
        .create_deployment(CreateDeploymentParams {
            project_name: "../escape".to_string(),
            source_file_manifest: vec![FileEntry::new("index.js", sha256_hash(b"x"))],
            source_file_config: "{}".to_string(),
            web_static_dir: None,
            update_in_place: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)));
}

/// Holds every single-shot upload open for a moment and tracks how many
/// overlap
struct SlowUploads {
    inner: RecordingTransport,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Transport for SlowUploads {
    async fn call(&self, request: DeployRequest) -> Result<Value, EngineError> {
        if request.method() != Method::UploadOneFile {
            return self.inner.call(request).await;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = self.inner.call(request).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_upload_all_respects_concurrency_limit() {
    let server = TestServer::new().await;
    let transport = Arc::new(SlowUploads {
        inner: RecordingTransport::new(server.manager.clone()),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let client = DeployClient::new(transport.clone());

    let files: Vec<(String, Vec<u8>)> = (0..8)
        .map(|i| (format!("assets/{i}.txt"), payload(100 + i, i as u32)))
        .collect();
    let borrowed: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(rel, content)| (rel.as_str(), content.as_slice()))
        .collect();
    let (_tmp, root) = project(&borrowed).await;
    let name = create(&client, "throttled", &borrowed).await;
    let needed = client.get_needed_files(&name).await.unwrap();
    assert_eq!(needed.len(), 8);

    let report = UploadOrchestrator::new(client, 2)
        .upload_all(&name, &root, &needed)
        .await;

    assert!(report.is_complete(), "{:?}", report.failed);
    assert_eq!(report.uploaded.len(), 8);
    assert_eq!(transport.peak.load(Ordering::SeqCst), 2);
    assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
}
