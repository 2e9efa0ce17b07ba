//! Secret-looking files never leave the machine

use std::sync::Arc;

use goobsync::errors::EngineError;
use goobsync::manifest::security;

use crate::support::{deployer, project, settings, RecordingTransport, TestServer, BASIC_APP};

#[tokio::test]
async fn test_denied_file_aborts_before_any_rpc() {
    for secret in [".env", "config/server.key", "certs/tls.pem", ".env.local", "db_password.txt"] {
        let mut files = BASIC_APP.to_vec();
        files.push((secret, &b"TOP SECRET"[..]));
        let (_tmp, root) = project(&files).await;

        let spy = Arc::new(RecordingTransport::disconnected());
        let err = deployer(spy.clone(), settings("basic-app"))
            .deploy(&root)
            .await
            .unwrap_err();

        match err {
            EngineError::Security { paths } => assert_eq!(paths, vec![secret.to_string()]),
            other => panic!("{secret}: unexpected error {other}"),
        }
        assert!(spy.calls().is_empty(), "{secret}: transport was called");
    }
}

#[tokio::test]
async fn test_every_offender_is_reported() {
    let mut files = BASIC_APP.to_vec();
    files.push((".env", &b"A=1"[..]));
    files.push(("keys/id_rsa", &b"----"[..]));
    let (_tmp, root) = project(&files).await;

    let spy = Arc::new(RecordingTransport::disconnected());
    let err = deployer(spy.clone(), settings("basic-app"))
        .deploy(&root)
        .await
        .unwrap_err();

    let EngineError::Security { paths } = err else {
        panic!("expected a security error");
    };
    assert_eq!(paths, vec![".env".to_string(), "keys/id_rsa".to_string()]);
    assert!(spy.calls().is_empty());
}

#[tokio::test]
async fn test_server_refuses_denied_manifest_entries() {
    // A client that skips the pre-flight check still cannot store secrets
    let server = TestServer::new().await;
    let params = rpc_contract::CreateDeploymentParams {
        project_name: "basic-app".to_string(),
        source_file_manifest: vec![rpc_contract::FileEntry::new(
            "secrets/api.json",
            goobsync::utils::sha256_hash(b"{}"),
        )],
        source_file_config: "{}".to_string(),
        web_static_dir: None,
        update_in_place: false,
    };
    assert!(matches!(
        server.manager.create_deployment(params).await,
        Err(EngineError::Security { .. })
    ));
}

#[test]
fn test_ordinary_names_pass() {
    security::validate(&["src/keyboard.ts", "docs/environment.md", "public/keys.html"]).unwrap();
}
