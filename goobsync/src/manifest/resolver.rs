//! Boundary to the file-list resolver
//!
//! Turning include/exclude/ignore rules into a file list belongs to the
//! project-config collaborator. The engine only needs the resolved list, so
//! it depends on [`FileListResolver`] and ships two simple implementations.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::filesys::paths::normalize_rel_path;
use crate::storage::settings::DeploySettings;

/// One file selected for deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Posix-style path relative to the project root
    pub rel_path: String,

    /// Where to read the bytes from
    pub abs_path: PathBuf,
}

/// Produces the concrete file list for a project root
#[async_trait]
pub trait FileListResolver: Send + Sync {
    async fn resolve(&self, root: &Dir) -> Result<Vec<ResolvedFile>, EngineError>;
}

/// Every regular file under the root, minus VCS metadata and the deploy
/// settings file itself
#[derive(Debug, Clone, Default)]
pub struct WholeTreeResolver;

const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn"];

#[async_trait]
impl FileListResolver for WholeTreeResolver {
    async fn resolve(&self, root: &Dir) -> Result<Vec<ResolvedFile>, EngineError> {
        let files = root
            .walk_files()
            .await?
            .into_iter()
            .filter(|rel| rel != DeploySettings::FILE_NAME)
            .filter(|rel| {
                !SKIPPED_DIRS
                    .iter()
                    .any(|dir| rel.split('/').next() == Some(*dir))
            })
            .map(|rel| ResolvedFile {
                abs_path: root.path().join(&rel),
                rel_path: rel,
            })
            .collect();
        Ok(files)
    }
}

/// A fixed list of project-relative paths
#[derive(Debug, Clone, Default)]
pub struct ExplicitResolver {
    pub rel_paths: Vec<String>,
}

impl ExplicitResolver {
    pub fn new<S: Into<String>>(rel_paths: impl IntoIterator<Item = S>) -> Self {
        Self {
            rel_paths: rel_paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl FileListResolver for ExplicitResolver {
    async fn resolve(&self, root: &Dir) -> Result<Vec<ResolvedFile>, EngineError> {
        self.rel_paths
            .iter()
            .map(|rel| {
                let rel_path = normalize_rel_path(rel)?;
                Ok(ResolvedFile {
                    abs_path: root.path().join(&rel_path),
                    rel_path,
                })
            })
            .collect()
    }
}
