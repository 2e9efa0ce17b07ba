//! Project name to live deployment mapping

use std::path::PathBuf;
use std::sync::Arc;

use crate::deploy::store::Store;
use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::filesys::paths::resolve_within;

/// Persisted per-project pointer at the live deployment.
///
/// Reads are open to anyone (the static-file server resolves projects
/// through [`resolve_static_dir`](Self::resolve_static_dir)); the only writer
/// is deployment activation.
#[derive(Clone)]
pub struct ActiveDeploymentRegistry {
    store: Arc<Store>,
    deployments_dir: Dir,
}

impl ActiveDeploymentRegistry {
    pub fn new(store: Arc<Store>, deployments_dir: Dir) -> Self {
        Self {
            store,
            deployments_dir,
        }
    }

    /// Deploy name currently live for `project_name`
    pub fn get_active(&self, project_name: &str) -> Result<Option<String>, EngineError> {
        Ok(self.store.get_active(project_name)?.map(|a| a.deploy_name))
    }

    /// Point `project_name` at `deploy_name`, returning the previous one
    pub(crate) fn set_active(
        &self,
        project_name: &str,
        deploy_name: &str,
    ) -> Result<Option<String>, EngineError> {
        self.store.activate(project_name, deploy_name)
    }

    /// Directory the static-file server should serve for `project_name`:
    /// the active deployment's `web_static_dir`, or its root when unset.
    pub fn resolve_static_dir(&self, project_name: &str) -> Result<Option<PathBuf>, EngineError> {
        let Some(deploy_name) = self.get_active(project_name)? else {
            return Ok(None);
        };
        let record = self
            .store
            .get_deployment(&deploy_name)?
            .ok_or_else(|| EngineError::NotFound(format!("deployment {deploy_name}")))?;

        let deploy_dir = resolve_within(self.deployments_dir.path(), &record.deploy_dir)?;
        let static_dir = match record.web_static_dir.as_deref() {
            Some(dir) => resolve_within(&deploy_dir, dir)?,
            None => deploy_dir,
        };
        Ok(Some(static_dir))
    }
}
