//! Server-side deployment lifecycle

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use rpc_contract::{CreateDeploymentParams, CreateDeploymentResult, FileEntry, VerifyResult};
use tracing::{debug, info, warn};

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::deploy::registry::ActiveDeploymentRegistry;
use crate::deploy::store::{DeploymentEventRecord, DeploymentRecord, Store};
use crate::deploy::upload::UploadSessions;
use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::filesys::paths::{normalize_rel_path, resolve_within};
use crate::manifest::security;
use crate::storage::layout::ServerLayout;
use crate::utils::{generate_deploy_name, now_rfc3339, sha256_hash};

/// Directory name shared by every update-in-place deployment of a project
const LIVE_DIR: &str = "live";

/// Per-project parent of update-in-place deployments that are not live yet
const STAGING_DIR: &str = ".staging";

/// Owns deployments from `createDeployment` to activation
pub struct DeploymentManager {
    store: Arc<Store>,
    registry: ActiveDeploymentRegistry,
    deployments_dir: Dir,
    sessions: UploadSessions,
}

impl DeploymentManager {
    pub fn new(store: Arc<Store>, layout: &ServerLayout) -> Self {
        let deployments_dir = layout.deployments_dir();
        Self {
            registry: ActiveDeploymentRegistry::new(store.clone(), deployments_dir.clone()),
            store,
            deployments_dir,
            sessions: UploadSessions::new(layout.uploads_dir()),
        }
    }

    /// Create the layout directories, open the database and build a manager
    pub async fn open(layout: &ServerLayout) -> Result<Self, EngineError> {
        layout.setup().await?;
        let store = Store::open(layout.database_file().path())?;
        info!("Deployment store at {}", layout.database_file().path().display());
        Ok(Self::new(Arc::new(store), layout))
    }

    pub fn registry(&self) -> &ActiveDeploymentRegistry {
        &self.registry
    }

    pub async fn create_deployment(
        &self,
        params: CreateDeploymentParams,
    ) -> Result<CreateDeploymentResult, EngineError> {
        validate_project_name(&params.project_name)?;
        let manifest = normalize_manifest(params.source_file_manifest)?;

        let paths: Vec<&str> = manifest.iter().map(|e| e.rel_path.as_str()).collect();
        security::validate(&paths)?;

        let web_static_dir = params
            .web_static_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(normalize_rel_path)
            .transpose()?;

        let deploy_name = generate_deploy_name(&params.project_name, Utc::now());
        let deploy_dir = if params.update_in_place {
            format!("{}/{}", params.project_name, LIVE_DIR)
        } else {
            format!("{}/{}", params.project_name, deploy_name)
        };
        let now = now_rfc3339();
        let record = DeploymentRecord {
            deploy_name: deploy_name.clone(),
            project_name: params.project_name,
            deploy_dir,
            web_static_dir,
            manifest,
            config_text: params.source_file_config,
            update_in_place: params.update_in_place,
            state: DeploymentState::Created,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        };
        Dir::new(self.content_dir(&record)?).create().await?;
        self.store.insert_deployment(&record)?;

        info!(
            "Created deployment {} ({} files, dir {})",
            deploy_name,
            record.manifest.len(),
            record.deploy_dir
        );
        Ok(CreateDeploymentResult { deploy_name })
    }

    /// Manifest entries with no matching content in the deployment directory.
    ///
    /// While the deployment still accepts uploads, content already held by the
    /// project's active deployment is copied over by hash instead of being
    /// requested from the client.
    pub async fn get_needed_files(&self, deploy_name: &str) -> Result<Vec<FileEntry>, EngineError> {
        let record = self.load(deploy_name)?;
        let content_dir = self.content_dir(&record)?;
        let donor = if record.state.accepts_uploads() {
            self.reuse_source(&record)?
        } else {
            None
        };

        let mut needed = Vec::new();
        let mut reused = 0usize;
        for entry in &record.manifest {
            let target = File::new(resolve_within(&content_dir, &entry.rel_path)?);
            if target.sha256_if_exists().await?.as_deref() == Some(entry.sha.as_str()) {
                continue;
            }

            if let Some((donor_dir, by_sha)) = &donor {
                if let Some(source_rel) = by_sha.get(&entry.sha) {
                    let source = File::new(resolve_within(donor_dir, source_rel)?);
                    if source.sha256_if_exists().await?.as_deref() == Some(entry.sha.as_str()) {
                        target.copy_from(&source).await?;
                        debug!("Reused {} from {}", entry.rel_path, source_rel);
                        reused += 1;
                        continue;
                    }
                }
            }

            needed.push(entry.clone());
        }

        info!(
            "Deployment {}: {} of {} files needed, {} reused",
            deploy_name,
            needed.len(),
            record.manifest.len(),
            reused
        );
        Ok(needed)
    }

    /// Directory and content-by-hash index of the project's active deployment,
    /// when it lives somewhere other than `record`'s own files. For an
    /// update-in-place deployment that is the live directory it is staged
    /// against.
    fn reuse_source(
        &self,
        record: &DeploymentRecord,
    ) -> Result<Option<(PathBuf, HashMap<String, String>)>, EngineError> {
        let Some(active_name) = self.registry.get_active(&record.project_name)? else {
            return Ok(None);
        };
        let Some(active) = self.store.get_deployment(&active_name)? else {
            return Ok(None);
        };
        let active_dir = self.content_dir(&active)?;
        if active_dir == self.content_dir(record)? {
            return Ok(None);
        }

        let by_sha = active
            .manifest
            .into_iter()
            .map(|e| (e.sha, e.rel_path))
            .collect();
        Ok(Some((active_dir, by_sha)))
    }

    /// Write a whole file in one call
    pub async fn upload_one_file(
        &self,
        deploy_name: &str,
        rel_path: &str,
        content: &[u8],
    ) -> Result<(), EngineError> {
        let record = self.load_for_upload(deploy_name)?;
        let (entry, target) = self.upload_target(&record, rel_path)?;

        let sha = sha256_hash(content);
        if sha != entry.sha {
            return Err(hash_mismatch(&entry, &sha));
        }

        target.write_atomic(content).await?;
        debug!("Stored {} ({} bytes) for {}", entry.rel_path, content.len(), deploy_name);
        self.mark_uploading(&record)
    }

    pub async fn start_multipart_upload(
        &self,
        deploy_name: &str,
        rel_path: &str,
    ) -> Result<(), EngineError> {
        let record = self.load_for_upload(deploy_name)?;
        let (entry, _) = self.upload_target(&record, rel_path)?;

        self.sessions.start(deploy_name, &entry.rel_path).await?;
        debug!("Started multipart upload of {} for {}", entry.rel_path, deploy_name);
        self.mark_uploading(&record)
    }

    pub async fn upload_file_part(
        &self,
        deploy_name: &str,
        rel_path: &str,
        chunk_starts_at: u64,
        chunk: &[u8],
    ) -> Result<(), EngineError> {
        let record = self.load_for_upload(deploy_name)?;
        let rel_path = normalize_rel_path(rel_path)?;
        let received = self
            .sessions
            .append(&record.deploy_name, &rel_path, chunk_starts_at, chunk)
            .await?;
        debug!("{} of {}: {} bytes received", rel_path, deploy_name, received);
        Ok(())
    }

    /// Check the assembled buffer against the manifest and move it into place
    pub async fn finish_multipart_upload(
        &self,
        deploy_name: &str,
        rel_path: &str,
    ) -> Result<(), EngineError> {
        let record = self.load_for_upload(deploy_name)?;
        let (entry, target) = self.upload_target(&record, rel_path)?;

        let finished = self.sessions.finish(deploy_name, &entry.rel_path).await?;
        if finished.sha != entry.sha {
            finished.buffer.delete().await?;
            return Err(hash_mismatch(&entry, &finished.sha));
        }

        target.replace_with(&finished.buffer).await?;
        debug!(
            "Stored {} ({} bytes, multipart) for {}",
            entry.rel_path, finished.len, deploy_name
        );
        Ok(())
    }

    /// The client will send no more content. Leftover multipart sessions are
    /// dropped.
    pub async fn finish_uploads(&self, deploy_name: &str) -> Result<(), EngineError> {
        let record = self.load(deploy_name)?;
        if record.state == DeploymentState::Verifying {
            return Ok(());
        }

        let abandoned = self.sessions.abort_deployment(deploy_name).await?;
        if abandoned > 0 {
            warn!("Dropped {} unfinished multipart uploads of {}", abandoned, deploy_name);
        }

        self.advance(&record, DeploymentEvent::UploadsFinished, "finish uploads", None)?;
        info!("Deployment {} finished uploading", deploy_name);
        Ok(())
    }

    /// Check every manifest entry on disk. A failure is recorded and leaves
    /// the deployment `failed`; the active deployment is never touched.
    pub async fn verify_deployment(&self, deploy_name: &str) -> Result<VerifyResult, EngineError> {
        let record = self.load(deploy_name)?;

        match record.state {
            DeploymentState::Failed => Ok(VerifyResult::error(
                record
                    .error
                    .unwrap_or_else(|| "deployment failed verification".to_string()),
            )),
            DeploymentState::Active | DeploymentState::Superseded => {
                Ok(match self.check_files(&record).await? {
                    Some(problem) => VerifyResult::error(problem),
                    None => VerifyResult::success(),
                })
            }
            DeploymentState::Verifying | DeploymentState::Verified => {
                match self.check_files(&record).await? {
                    None => {
                        if record.state == DeploymentState::Verifying {
                            self.advance(&record, DeploymentEvent::VerifySucceeded, "verify", None)?;
                        }
                        info!("Deployment {} verified", deploy_name);
                        Ok(VerifyResult::success())
                    }
                    Some(problem) => {
                        self.advance(
                            &record,
                            DeploymentEvent::VerifyFailed(problem.clone()),
                            "verify",
                            Some(&problem),
                        )?;
                        if is_staged(&record) {
                            Dir::new(self.content_dir(&record)?).delete().await?;
                        }
                        warn!("Deployment {} failed verification: {}", deploy_name, problem);
                        Ok(VerifyResult::error(problem))
                    }
                }
            }
            DeploymentState::Created | DeploymentState::Uploading => {
                Err(invalid_state(&record, "verify before uploads are finished"))
            }
        }
    }

    /// Make a verified deployment its project's live one. Re-activating the
    /// active deployment changes nothing; re-activating a superseded one
    /// (rollback) checks its files again first.
    pub async fn activate_deployment(&self, deploy_name: &str) -> Result<(), EngineError> {
        let record = self.load(deploy_name)?;

        match record.state {
            DeploymentState::Active => {
                if self.registry.get_active(&record.project_name)?.as_deref() == Some(deploy_name)
                {
                    debug!("Deployment {} already active", deploy_name);
                    return Ok(());
                }
            }
            DeploymentState::Verified => {}
            DeploymentState::Superseded => {
                if let Some(problem) = self.check_files(&record).await? {
                    return Err(EngineError::Verification(format!(
                        "cannot roll back to {}: {}",
                        deploy_name, problem
                    )));
                }
            }
            _ => return Err(invalid_state(&record, "activate")),
        }

        let previous = if is_staged(&record) {
            self.activate_staged(&record).await?
        } else {
            self.registry.set_active(&record.project_name, deploy_name)?
        };
        info!(
            "Activated {} for project {} (previous: {})",
            deploy_name,
            record.project_name,
            previous.as_deref().unwrap_or("none")
        );
        Ok(())
    }

    pub fn get_deployment(&self, deploy_name: &str) -> Result<DeploymentRecord, EngineError> {
        self.load(deploy_name)
    }

    pub fn list_deployments(&self, project_name: &str) -> Result<Vec<DeploymentRecord>, EngineError> {
        self.store.list_deployments(project_name)
    }

    pub fn deployment_events(
        &self,
        deploy_name: &str,
    ) -> Result<Vec<DeploymentEventRecord>, EngineError> {
        self.load(deploy_name)?;
        self.store.events(deploy_name)
    }

    /// Absolute directory of a deployment, checked against the root
    pub fn deploy_dir(&self, record: &DeploymentRecord) -> Result<PathBuf, EngineError> {
        resolve_within(self.deployments_dir.path(), &record.deploy_dir)
    }

    /// Where a deployment's files are right now. An update-in-place
    /// deployment is staged beside `live` until it is activated, so uploads
    /// and verification never touch the directory being served.
    pub fn content_dir(&self, record: &DeploymentRecord) -> Result<PathBuf, EngineError> {
        if is_staged(record) {
            resolve_within(
                self.deployments_dir.path(),
                &format!("{}/{}/{}", record.project_name, STAGING_DIR, record.deploy_name),
            )
        } else {
            self.deploy_dir(record)
        }
    }

    /// Swap a staged update-in-place deployment into `live` and repoint the
    /// project. The old live directory is parked beside the staging dir
    /// until the pointer is updated, and put back if that fails.
    async fn activate_staged(&self, record: &DeploymentRecord) -> Result<Option<String>, EngineError> {
        let staged = Dir::new(self.content_dir(record)?);
        let live = Dir::new(self.deploy_dir(record)?);
        let parked = resolve_within(
            self.deployments_dir.path(),
            &format!(
                "{}/{}/{}.previous",
                record.project_name, STAGING_DIR, record.deploy_name
            ),
        )?;

        let previous_live = if live.exists().await {
            Dir::new(&parked).delete().await?;
            Some(live.rename_to(&parked).await?)
        } else {
            None
        };
        if let Err(e) = staged.rename_to(live.path()).await {
            if let Some(old) = &previous_live {
                old.rename_to(live.path()).await?;
            }
            return Err(e);
        }

        match self.registry.set_active(&record.project_name, &record.deploy_name) {
            Ok(previous) => {
                if let Some(old) = previous_live {
                    old.delete().await?;
                }
                Ok(previous)
            }
            Err(e) => {
                warn!("Restoring live files of {} after failed activation", record.project_name);
                live.rename_to(staged.path()).await?;
                if let Some(old) = previous_live {
                    old.rename_to(live.path()).await?;
                }
                Err(e)
            }
        }
    }

    fn load(&self, deploy_name: &str) -> Result<DeploymentRecord, EngineError> {
        self.store
            .get_deployment(deploy_name)?
            .ok_or_else(|| EngineError::NotFound(format!("deployment {deploy_name}")))
    }

    fn load_for_upload(&self, deploy_name: &str) -> Result<DeploymentRecord, EngineError> {
        let record = self.load(deploy_name)?;
        if !record.state.accepts_uploads() {
            return Err(invalid_state(&record, "accept uploads"));
        }
        Ok(record)
    }

    /// Manifest entry and containment-checked destination of an upload
    fn upload_target(
        &self,
        record: &DeploymentRecord,
        rel_path: &str,
    ) -> Result<(FileEntry, File), EngineError> {
        let rel_path = normalize_rel_path(rel_path)?;
        let entry = record.manifest_entry(&rel_path).cloned().ok_or_else(|| {
            EngineError::ValidationError(format!(
                "{} is not in the manifest of {}",
                rel_path, record.deploy_name
            ))
        })?;
        let target = resolve_within(&self.content_dir(record)?, &entry.rel_path)?;
        Ok((entry, File::new(target)))
    }

    fn mark_uploading(&self, record: &DeploymentRecord) -> Result<(), EngineError> {
        if record.state == DeploymentState::Created {
            // A concurrent upload may have moved it already
            self.advance(record, DeploymentEvent::UploadStarted, "upload", None)
                .map(|_| ())
                .or_else(|e| match e {
                    EngineError::InvalidState { .. } => Ok(()),
                    other => Err(other),
                })?;
        }
        Ok(())
    }

    /// Run `event` through the state machine and persist the result
    fn advance(
        &self,
        record: &DeploymentRecord,
        event: DeploymentEvent,
        action: &str,
        error: Option<&str>,
    ) -> Result<DeploymentState, EngineError> {
        let mut fsm = DeploymentFsm::from_state(record.state);
        let next = fsm
            .process(event)
            .map_err(|_| invalid_state(record, action))?;
        if next == record.state {
            return Ok(next);
        }

        let error = error.or(fsm.error());
        if !self
            .store
            .transition(&record.deploy_name, record.state, next, error, None)?
        {
            return Err(invalid_state(record, action));
        }
        debug!("Deployment {}: {} -> {}", record.deploy_name, record.state, next);
        Ok(next)
    }

    /// Description of every missing or mismatched file, or `None` if all
    /// manifest entries are present with the expected hash
    async fn check_files(&self, record: &DeploymentRecord) -> Result<Option<String>, EngineError> {
        let deploy_dir = self.content_dir(record)?;
        let mut missing = Vec::new();
        let mut mismatched = Vec::new();

        for entry in &record.manifest {
            let file = File::new(resolve_within(&deploy_dir, &entry.rel_path)?);
            match file.sha256_if_exists().await? {
                None => missing.push(entry.rel_path.as_str()),
                Some(sha) if sha != entry.sha => mismatched.push(entry.rel_path.as_str()),
                Some(_) => {}
            }
        }

        let mut problems = Vec::new();
        if !missing.is_empty() {
            problems.push(format!("missing files: {}", missing.join(", ")));
        }
        if !mismatched.is_empty() {
            problems.push(format!("hash mismatch: {}", mismatched.join(", ")));
        }
        Ok((!problems.is_empty()).then(|| problems.join("; ")))
    }
}

/// Project names become directory names: `[A-Za-z0-9._-]`, 1 to 64 chars,
/// no leading dot
pub fn validate_project_name(name: &str) -> Result<(), EngineError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if name.is_empty() || name.len() > 64 || name.starts_with('.') || !valid_chars {
        return Err(EngineError::ValidationError(format!(
            "invalid project name: {name:?}"
        )));
    }
    Ok(())
}

/// Normalized, sorted manifest with lower-case hex hashes and unique paths
fn normalize_manifest(entries: Vec<FileEntry>) -> Result<Vec<FileEntry>, EngineError> {
    let mut seen = BTreeSet::new();
    let mut manifest = Vec::with_capacity(entries.len());
    for entry in entries {
        let rel_path = normalize_rel_path(&entry.rel_path)?;
        let sha = entry.sha.to_ascii_lowercase();
        if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EngineError::ValidationError(format!(
                "{} has an invalid sha256: {:?}",
                rel_path, entry.sha
            )));
        }
        if !seen.insert(rel_path.clone()) {
            return Err(EngineError::ValidationError(format!(
                "duplicate manifest path: {rel_path}"
            )));
        }
        manifest.push(FileEntry::new(rel_path, sha));
    }

    manifest.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(manifest)
}

/// An update-in-place deployment that has not been live yet
fn is_staged(record: &DeploymentRecord) -> bool {
    record.update_in_place
        && !matches!(record.state, DeploymentState::Active | DeploymentState::Superseded)
}

fn invalid_state(record: &DeploymentRecord, action: &str) -> EngineError {
    EngineError::InvalidState {
        deploy_name: record.deploy_name.clone(),
        state: record.state.to_string(),
        action: action.to_string(),
    }
}

fn hash_mismatch(entry: &FileEntry, actual: &str) -> EngineError {
    EngineError::ValidationError(format!(
        "{}: content sha256 {} does not match manifest {}",
        entry.rel_path, actual, entry.sha
    ))
}
