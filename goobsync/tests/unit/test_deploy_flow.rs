//! End-to-end deploy runs against an in-process server

use std::sync::Arc;

use goobsync::deploy::fsm::DeploymentState;
use goobsync::manifest::ExplicitResolver;
use rpc_contract::Method;

use crate::support::{deployer, project, settings, RecordingTransport, TestServer, BASIC_APP};

#[tokio::test]
async fn test_basic_app_goes_live_with_identical_files() {
    let server = TestServer::new().await;
    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let (_tmp, root) = project(BASIC_APP).await;

    let outcome = deployer(transport.clone(), settings("basic-app"))
        .deploy(&root)
        .await
        .unwrap();

    assert_eq!(outcome.manifest_len, 3);
    assert_eq!(outcome.needed, 3);
    assert!(outcome.report.is_complete());
    assert_eq!(
        server.manager.registry().get_active("basic-app").unwrap(),
        Some(outcome.deploy_name.clone())
    );

    let mut expected: Vec<(String, Vec<u8>)> = BASIC_APP
        .iter()
        .map(|(rel, content)| (rel.to_string(), content.to_vec()))
        .collect();
    expected.sort();
    assert_eq!(server.active_files("basic-app").await, expected);

    assert_eq!(
        transport.methods().last(),
        Some(&Method::ActivateDeployment)
    );
}

#[tokio::test]
async fn test_redeploy_uploads_only_changed_file() {
    let server = TestServer::new().await;
    let (_tmp, root) = project(BASIC_APP).await;

    let first = Arc::new(RecordingTransport::new(server.manager.clone()));
    deployer(first, settings("basic-app"))
        .deploy(&root)
        .await
        .unwrap();

    root.file("index.js")
        .write_bytes(b"console.log('hello again');\n")
        .await
        .unwrap();

    let second = Arc::new(RecordingTransport::new(server.manager.clone()));
    let outcome = deployer(second.clone(), settings("basic-app"))
        .deploy(&root)
        .await
        .unwrap();

    assert_eq!(outcome.needed, 1);
    assert_eq!(outcome.report.uploaded, vec!["index.js".to_string()]);
    assert_eq!(second.uploaded_paths(), vec!["index.js".to_string()]);

    let files = server.active_files("basic-app").await;
    assert_eq!(files.len(), 3);
    let index = files.iter().find(|(rel, _)| rel == "index.js").unwrap();
    assert_eq!(index.1, b"console.log('hello again');\n");
}

#[tokio::test]
async fn test_unchanged_redeploy_needs_nothing() {
    let server = TestServer::new().await;
    let (_tmp, root) = project(BASIC_APP).await;

    for _ in 0..2 {
        let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
        deployer(transport, settings("basic-app"))
            .deploy(&root)
            .await
            .unwrap();
    }

    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let outcome = deployer(transport.clone(), settings("basic-app"))
        .deploy(&root)
        .await
        .unwrap();
    assert_eq!(outcome.needed, 0);
    assert!(transport.uploaded_paths().is_empty());
}

#[tokio::test]
async fn test_rollback_reactivates_older_deployment() {
    let server = TestServer::new().await;
    let (_tmp, root) = project(BASIC_APP).await;

    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let v1 = deployer(transport.clone(), settings("basic-app"))
        .deploy(&root)
        .await
        .unwrap()
        .deploy_name;
    let v1_files = server.deployment_files(&v1).await;

    root.file("index.js").write_bytes(b"// v2\n").await.unwrap();
    let v2 = deployer(transport, settings("basic-app"))
        .deploy(&root)
        .await
        .unwrap()
        .deploy_name;

    assert_eq!(
        server.manager.get_deployment(&v1).unwrap().state,
        DeploymentState::Superseded
    );

    server.manager.activate_deployment(&v1).await.unwrap();

    let registry = server.manager.registry();
    assert_eq!(registry.get_active("basic-app").unwrap(), Some(v1.clone()));
    assert_eq!(server.deployment_files(&v1).await, v1_files);
    assert_eq!(
        server.manager.get_deployment(&v2).unwrap().state,
        DeploymentState::Superseded
    );
    // The newer deployment's files stay too
    assert_eq!(server.deployment_files(&v2).await.len(), 3);
}

#[tokio::test]
async fn test_update_in_place_shares_one_directory() {
    let server = TestServer::new().await;
    let (_tmp, root) = project(BASIC_APP).await;
    let mut in_place = settings("site");
    in_place.update_in_place = true;

    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let v1 = deployer(transport.clone(), in_place.clone())
        .deploy(&root)
        .await
        .unwrap()
        .deploy_name;

    root.file("index.js").write_bytes(b"// in place\n").await.unwrap();
    let second = Arc::new(RecordingTransport::new(server.manager.clone()));
    let v2 = deployer(second.clone(), in_place)
        .deploy(&root)
        .await
        .unwrap()
        .deploy_name;

    let r1 = server.manager.get_deployment(&v1).unwrap();
    let r2 = server.manager.get_deployment(&v2).unwrap();
    assert_eq!(r1.deploy_dir, "site/live");
    assert_eq!(r1.deploy_dir, r2.deploy_dir);
    assert_eq!(second.uploaded_paths(), vec!["index.js".to_string()]);

    // The shared directory no longer matches v1, so rolling back is refused
    assert!(server.manager.activate_deployment(&v1).await.is_err());
    assert_eq!(
        server.manager.registry().get_active("site").unwrap(),
        Some(v2)
    );
}

#[tokio::test]
async fn test_failed_in_place_deploy_keeps_live_files() {
    let server = TestServer::new().await;
    let (_tmp, root) = project(BASIC_APP).await;
    let mut in_place = settings("site");
    in_place.update_in_place = true;

    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let v1 = deployer(transport, in_place.clone())
        .deploy(&root)
        .await
        .unwrap()
        .deploy_name;
    let live_before = server.active_files("site").await;

    root.file("index.js").write_bytes(b"// half done\n").await.unwrap();
    root.file("package.json").write_bytes(b"{}").await.unwrap();
    let flaky =
        Arc::new(RecordingTransport::new(server.manager.clone()).failing_uploads_of("package.json"));
    assert!(deployer(flaky.clone(), in_place).deploy(&root).await.is_err());
    assert!(flaky.uploaded_paths().contains(&"index.js".to_string()));

    assert_eq!(server.manager.registry().get_active("site").unwrap(), Some(v1.clone()));
    assert_eq!(server.active_files("site").await, live_before);
    assert!(server
        .manager
        .verify_deployment(&v1)
        .await
        .unwrap()
        .is_success());
}

#[tokio::test]
async fn test_explicit_file_list_limits_manifest() {
    let server = TestServer::new().await;
    let (_tmp, root) = project(BASIC_APP).await;

    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let outcome = deployer(transport, settings("basic-app"))
        .with_resolver(ExplicitResolver::new(["index.js", "public/index.html"]))
        .deploy(&root)
        .await
        .unwrap();

    assert_eq!(outcome.manifest_len, 2);
    let files: Vec<String> = server
        .active_files("basic-app")
        .await
        .into_iter()
        .map(|(rel, _)| rel)
        .collect();
    assert_eq!(files, vec!["index.js", "public/index.html"]);
}

#[tokio::test]
async fn test_static_dir_resolves_for_active_project() {
    let server = TestServer::new().await;
    let (_tmp, root) = project(BASIC_APP).await;
    let mut with_static = settings("basic-app");
    with_static.web_static_dir = Some("public".to_string());

    let transport = Arc::new(RecordingTransport::new(server.manager.clone()));
    let outcome = deployer(transport, with_static).deploy(&root).await.unwrap();

    let static_dir = server
        .manager
        .registry()
        .resolve_static_dir("basic-app")
        .unwrap()
        .unwrap();
    assert!(static_dir.ends_with(format!("basic-app/{}/public", outcome.deploy_name)));
    assert!(static_dir.join("index.html").is_file());
}
