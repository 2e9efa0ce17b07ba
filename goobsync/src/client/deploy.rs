//! One deploy run, end to end

use std::sync::Arc;

use rpc_contract::CreateDeploymentParams;
use serde::Serialize;
use tracing::{error, info};

use crate::client::orchestrator::{UploadOrchestrator, UploadReport};
use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::manifest::{self, security, FileListResolver, WholeTreeResolver};
use crate::rpc::{DeployClient, HttpTransport, Transport};
use crate::storage::settings::DeploySettings;

/// What a successful run did
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub project_name: String,
    pub deploy_name: String,
    pub manifest_len: usize,
    pub needed: usize,
    pub report: UploadReport,
}

/// Drives a project's files through create, upload, verify and activate
pub struct Deployer {
    client: DeployClient,
    settings: DeploySettings,
    config_text: String,
    resolver: Box<dyn FileListResolver>,
}

impl Deployer {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: DeploySettings,
        config_text: impl Into<String>,
    ) -> Self {
        Self {
            client: DeployClient::new(transport),
            settings,
            config_text: config_text.into(),
            resolver: Box::new(WholeTreeResolver),
        }
    }

    /// Replace the default whole-tree file selection
    pub fn with_resolver(mut self, resolver: impl FileListResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Load `goob-deploy.json` from `root` and talk HTTP to its `dest-url`.
    /// `api_key` overrides the key from the settings file.
    pub async fn from_project(root: &Dir, api_key: Option<String>) -> Result<Self, EngineError> {
        let (mut settings, config_text) = DeploySettings::load(root).await?;
        if api_key.is_some() {
            settings.api_key = api_key;
        }
        let transport = HttpTransport::new(settings.endpoint()?, settings.api_key())?;
        info!("Deploying {} to {}", settings.project_name, transport.endpoint());
        Ok(Self::new(Arc::new(transport), settings, config_text))
    }

    /// Run the whole protocol. Nothing is sent if the file set fails the
    /// security check; nothing is activated if verification fails.
    pub async fn deploy(&self, root: &Dir) -> Result<DeployOutcome, EngineError> {
        let files = self.resolver.resolve(root).await?;
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        security::validate(&paths)?;

        let manifest = manifest::build(&files, self.config_text.clone()).await?;
        let manifest_len = manifest.len();
        info!("Manifest of {} has {} files", self.settings.project_name, manifest_len);

        let created = self
            .client
            .create_deployment(CreateDeploymentParams {
                project_name: self.settings.project_name.clone(),
                source_file_config: manifest.config_text().to_string(),
                source_file_manifest: manifest.into_entries(),
                web_static_dir: self.settings.web_static_dir.clone(),
                update_in_place: self.settings.update_in_place,
            })
            .await?;
        let deploy_name = created.deploy_name;
        info!("Created deployment {}", deploy_name);

        let needed = self.client.get_needed_files(&deploy_name).await?;
        info!("{} of {} files need uploading", needed.len(), manifest_len);

        let orchestrator = UploadOrchestrator::new(self.client.clone(), self.settings.concurrency);
        let report = orchestrator.upload_all(&deploy_name, root, &needed).await;

        self.client.finish_uploads(&deploy_name).await?;

        let verified = self.client.verify_deployment(&deploy_name).await?;
        if !verified.is_success() {
            let mut reason = verified
                .error
                .unwrap_or_else(|| "server reported an error".to_string());
            if !report.is_complete() {
                let failed: Vec<&str> =
                    report.failed.iter().map(|f| f.rel_path.as_str()).collect();
                reason = format!("{} (failed uploads: {})", reason, failed.join(", "));
            }
            error!("Deployment {} did not verify: {}", deploy_name, reason);
            return Err(EngineError::Verification(reason));
        }

        self.client.activate_deployment(&deploy_name).await?;
        info!("Deployment {} is live", deploy_name);

        Ok(DeployOutcome {
            project_name: self.settings.project_name.clone(),
            deploy_name,
            manifest_len,
            needed: needed.len(),
            report,
        })
    }
}
