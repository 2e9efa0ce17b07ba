//! Multipart upload sessions
//!
//! One session per `(deploy name, relative path)`. Parts are appended to a
//! temp buffer under the uploads directory and must arrive at exactly the
//! offset the session has received so far.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    deploy_name: String,
    rel_path: String,
}

impl SessionKey {
    fn new(deploy_name: &str, rel_path: &str) -> Self {
        Self {
            deploy_name: deploy_name.to_string(),
            rel_path: rel_path.to_string(),
        }
    }
}

struct UploadSession {
    buffer: File,
    received: u64,
    hasher: Sha256,
}

/// Assembled buffer handed back by [`UploadSessions::finish`]
#[derive(Debug)]
pub struct FinishedUpload {
    pub buffer: File,
    pub len: u64,
    pub sha: String,
}

/// Open multipart sessions of every deployment
pub struct UploadSessions {
    uploads_dir: Dir,
    sessions: Mutex<HashMap<SessionKey, Arc<AsyncMutex<UploadSession>>>>,
}

impl UploadSessions {
    pub fn new(uploads_dir: Dir) -> Self {
        Self {
            uploads_dir,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, key: &SessionKey) -> Option<Arc<AsyncMutex<UploadSession>>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(key).cloned()
    }

    fn take(&self, key: &SessionKey) -> Option<Arc<AsyncMutex<UploadSession>>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(key)
    }

    /// Open a session with an empty buffer. An existing session for the same
    /// path is discarded and started over.
    pub async fn start(&self, deploy_name: &str, rel_path: &str) -> Result<(), EngineError> {
        let key = SessionKey::new(deploy_name, rel_path);
        if let Some(previous) = self.take(&key) {
            debug!("Restarting multipart upload of {} for {}", rel_path, deploy_name);
            previous.lock().await.buffer.delete().await?;
        }

        let buffer = self
            .uploads_dir
            .file(format!("{}.part", uuid::Uuid::new_v4().simple()));
        buffer.write_bytes(&[]).await?;

        let session = UploadSession {
            buffer,
            received: 0,
            hasher: Sha256::new(),
        };
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(key, Arc::new(AsyncMutex::new(session)));
        Ok(())
    }

    /// Append one part. `offset` must equal the bytes received so far; a
    /// rejected part leaves the session untouched.
    pub async fn append(
        &self,
        deploy_name: &str,
        rel_path: &str,
        offset: u64,
        bytes: &[u8],
    ) -> Result<u64, EngineError> {
        let key = SessionKey::new(deploy_name, rel_path);
        let session = self.lookup(&key).ok_or_else(|| no_session(deploy_name, rel_path))?;
        let mut session = session.lock().await;

        if offset != session.received {
            return Err(EngineError::InvalidParams(format!(
                "part of {} starts at {}, expected {}",
                rel_path, offset, session.received
            )));
        }

        session.buffer.append_bytes(bytes).await?;
        session.hasher.update(bytes);
        session.received += bytes.len() as u64;
        Ok(session.received)
    }

    /// Close the session and return its buffer for the caller to check and
    /// move into place
    pub async fn finish(
        &self,
        deploy_name: &str,
        rel_path: &str,
    ) -> Result<FinishedUpload, EngineError> {
        let key = SessionKey::new(deploy_name, rel_path);
        let session = self.take(&key).ok_or_else(|| no_session(deploy_name, rel_path))?;
        let session = session.lock().await;

        Ok(FinishedUpload {
            buffer: session.buffer.clone(),
            len: session.received,
            sha: hex::encode(session.hasher.clone().finalize()),
        })
    }

    /// Drop every open session of a deployment and remove their buffers
    pub async fn abort_deployment(&self, deploy_name: &str) -> Result<usize, EngineError> {
        let doomed: Vec<_> = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let keys: Vec<SessionKey> = sessions
                .keys()
                .filter(|k| k.deploy_name == deploy_name)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| sessions.remove(k)).collect()
        };

        for session in &doomed {
            session.lock().await.buffer.delete().await?;
        }
        Ok(doomed.len())
    }

}

#[cfg(test)]
impl UploadSessions {
    fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn no_session(deploy_name: &str, rel_path: &str) -> EngineError {
    EngineError::InvalidParams(format!(
        "no multipart upload in progress for {} in {}",
        rel_path, deploy_name
    ))
}
