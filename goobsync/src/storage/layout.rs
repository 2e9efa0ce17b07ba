//! Server storage layout

use std::path::PathBuf;

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of a server's data directory
#[derive(Debug, Clone)]
pub struct ServerLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl ServerLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root every `deployDir` is relative to
    pub fn deployments_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("deployments"))
    }

    /// Temp buffers of in-flight multipart uploads
    pub fn uploads_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("uploads"))
    }

    /// SQLite database file
    pub fn database_file(&self) -> File {
        File::new(self.base_dir.join("state.sqlite3"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), EngineError> {
        self.deployments_dir().create().await?;
        self.uploads_dir().create().await?;
        Ok(())
    }
}

impl Default for ServerLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/goobsync");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".goobsync");

        Self::new(base_dir)
    }
}
