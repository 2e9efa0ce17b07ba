//! JSON-RPC over a real HTTP listener, and router-level protocol errors

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use goobsync::client::Deployer;
use goobsync::errors::EngineError;
use goobsync::rpc::{DeployClient, HttpTransport};
use goobsync::server::{router, serve_with_listener, ServerState};
use http::{Request, StatusCode};
use rpc_contract::{codes, RpcResponse, API_KEY_HEADER};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceExt;
use url::Url;

use crate::support::{payload, project, settings, TestServer, BASIC_APP};

const KEY: &str = "correct horse battery staple";

fn app(server: &TestServer) -> Router {
    let state = Arc::new(ServerState::new(
        server.manager.clone(),
        Some(SecretString::from(KEY.to_string())),
        false,
    ));
    router(state, 4 * 1024 * 1024)
}

struct Running {
    addr: SocketAddr,
    _stop: oneshot::Sender<()>,
}

async fn listen(server: &TestServer) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let (addr, _handle) = serve_with_listener(listener, app(server), async {
        let _ = stopped.await;
    })
    .unwrap();
    Running { addr, _stop: stop }
}

fn transport(addr: SocketAddr, key: Option<&str>) -> Arc<HttpTransport> {
    let endpoint = Url::parse(&format!("http://{addr}/rpc")).unwrap();
    let key = key.map(|k| SecretString::from(k.to_string()));
    Arc::new(HttpTransport::new(endpoint, key).unwrap())
}

async fn post(app: Router, body: &str, key: Option<&str>) -> (StatusCode, RpcResponse) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/rpc")
        .header("content-type", "application/json");
    if let Some(key) = key {
        request = request.header(API_KEY_HEADER, key);
    }
    let response = app
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_deploy_over_http_with_multipart_file() {
    let server = TestServer::new().await;
    let running = listen(&server).await;

    let big = payload(150_000, 42);
    let mut files = BASIC_APP.to_vec();
    files.push(("public/bundle.js", big.as_slice()));
    let (_tmp, root) = project(&files).await;

    let outcome = Deployer::new(transport(running.addr, Some(KEY)), settings("basic-app"), "{}")
        .deploy(&root)
        .await
        .unwrap();

    assert_eq!(outcome.manifest_len, 4);
    let stored = server.active_files("basic-app").await;
    let bundle = stored.iter().find(|(rel, _)| rel == "public/bundle.js").unwrap();
    assert_eq!(bundle.1, big);
}

#[tokio::test]
async fn test_deploy_from_project_settings_file() {
    let server = TestServer::new().await;
    let running = listen(&server).await;
    let (_tmp, root) = project(BASIC_APP).await;

    let config = json!({
        "project-name": "basic-app",
        "dest-url": format!("http://{}", running.addr),
        "web-static-dir": "public",
        "api-key": KEY,
    });
    root.file("goob-deploy.json")
        .write_bytes(config.to_string().as_bytes())
        .await
        .unwrap();

    let deployer = Deployer::from_project(&root, None).await.unwrap();
    let outcome = deployer.deploy(&root).await.unwrap();
    assert_eq!(outcome.manifest_len, 3);

    let record = server.manager.get_deployment(&outcome.deploy_name).unwrap();
    assert_eq!(record.config_text, config.to_string());
    assert_eq!(record.web_static_dir.as_deref(), Some("public"));
}

#[tokio::test]
async fn test_missing_or_wrong_key_is_rejected() {
    let server = TestServer::new().await;
    let running = listen(&server).await;
    let (_tmp, root) = project(BASIC_APP).await;

    for key in [None, Some("wrong")] {
        let err = Deployer::new(transport(running.addr, key), settings("basic-app"), "{}")
            .deploy(&root)
            .await
            .unwrap_err();
        match err {
            EngineError::Rpc { method, code, .. } => {
                assert_eq!(method, "createDeployment");
                assert_eq!(code, Some(codes::UNAUTHORIZED));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert!(server.manager.list_deployments("basic-app").unwrap().is_empty());
}

#[tokio::test]
async fn test_only_needed_files_is_open_without_key() {
    let server = TestServer::new().await;
    let running = listen(&server).await;
    let (_tmp, root) = project(BASIC_APP).await;

    let name = Deployer::new(transport(running.addr, Some(KEY)), settings("basic-app"), "{}")
        .deploy(&root)
        .await
        .unwrap()
        .deploy_name;

    let anonymous = DeployClient::new(transport(running.addr, None));
    assert!(anonymous.get_needed_files(&name).await.unwrap().is_empty());

    let err = anonymous.verify_deployment(&name).await.unwrap_err();
    assert_eq!(err.rpc_code(), codes::UNAUTHORIZED);
    assert!(anonymous.activate_deployment(&name).await.is_err());
}

#[tokio::test]
async fn test_engine_errors_keep_their_codes_over_http() {
    let server = TestServer::new().await;
    let running = listen(&server).await;
    let client = DeployClient::new(transport(running.addr, Some(KEY)));

    let err = client.activate_deployment("nope-20260101000000-deadbeef").await.unwrap_err();
    assert_eq!(err.rpc_code(), codes::NOT_FOUND);
    assert!(err.to_string().contains("activateDeployment"));
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = TestServer::new().await;

    let (status, body) = post(app(&server), "{not json", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.error.unwrap().code, codes::PARSE_ERROR);
    assert_eq!(body.id, Value::Null);

    let (_, body) = post(
        app(&server),
        r#"{"jsonrpc":"1.0","method":"finishUploads","params":{},"id":1}"#,
        Some(KEY),
    )
    .await;
    assert_eq!(body.error.unwrap().code, codes::INVALID_REQUEST);

    let (_, body) = post(
        app(&server),
        r#"{"jsonrpc":"2.0","method":"createdeployment","params":{},"id":7}"#,
        Some(KEY),
    )
    .await;
    assert_eq!(body.id, json!(7));
    assert_eq!(body.error.unwrap().code, codes::METHOD_NOT_FOUND);

    let (_, body) = post(
        app(&server),
        r#"{"jsonrpc":"2.0","method":"uploadFilePart","params":{"deployName":"x"},"id":8}"#,
        Some(KEY),
    )
    .await;
    assert_eq!(body.error.unwrap().code, codes::INVALID_PARAMS);

    let (status, body) = post(
        app(&server),
        r#"{"jsonrpc":"2.0","method":"finishUploads","params":{"deployName":"x"},"id":9}"#,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.error.unwrap().code, codes::UNAUTHORIZED);
}

#[tokio::test]
async fn test_void_methods_return_null_result() {
    let server = TestServer::new().await;
    let (_, created) = post(
        app(&server),
        &json!({
            "jsonrpc": "2.0",
            "method": "createDeployment",
            "params": {
                "projectName": "app",
                "sourceFileManifest": [{"relPath": "a.txt", "sha": goobsync::utils::sha256_hash(b"")}],
                "sourceFileConfig": ""
            },
            "id": 1
        })
        .to_string(),
        Some(KEY),
    )
    .await;
    let deploy_name = created.result.unwrap()["deployName"].as_str().unwrap().to_string();

    let (status, body) = post(
        app(&server),
        &json!({
            "jsonrpc": "2.0",
            "method": "finishUploads",
            "params": {"deployName": deploy_name},
            "id": 2
        })
        .to_string(),
        Some(KEY),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.error.is_none());
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::new().await;
    let response = app(&server)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["service"], "goobsync");
    assert_eq!(health["status"], "healthy");
}
