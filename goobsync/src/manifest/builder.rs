//! Source manifest construction

use std::collections::BTreeMap;

use rpc_contract::FileEntry;
use tracing::debug;

use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::manifest::resolver::ResolvedFile;

/// The file set of one deploy run plus the config text that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceManifest {
    entries: Vec<FileEntry>,
    config_text: String,
}

impl SourceManifest {
    /// Entries sorted by relative path
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn config_text(&self) -> &str {
        &self.config_text
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, rel_path: &str) -> Option<&FileEntry> {
        self.entries
            .binary_search_by(|e| e.rel_path.as_str().cmp(rel_path))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn into_entries(self) -> Vec<FileEntry> {
        self.entries
    }
}

/// Hash every resolved file and produce a deterministic manifest
pub async fn build(
    files: &[ResolvedFile],
    config_text: impl Into<String>,
) -> Result<SourceManifest, EngineError> {
    let mut by_path = BTreeMap::new();

    for resolved in files {
        if by_path.contains_key(&resolved.rel_path) {
            continue;
        }
        let sha = File::new(&resolved.abs_path).sha256().await?;
        debug!("Hashed {} -> {}", resolved.rel_path, sha);
        by_path.insert(resolved.rel_path.clone(), sha);
    }

    Ok(SourceManifest {
        entries: by_path
            .into_iter()
            .map(|(rel_path, sha)| FileEntry { rel_path, sha })
            .collect(),
        config_text: config_text.into(),
    })
}
