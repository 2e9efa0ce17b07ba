//! Settings file management

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::logs::LogLevel;
use crate::storage::layout::ServerLayout;

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub json_logs: bool,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Data directory; defaults to the platform layout
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Shared secret expected in the `x-api-key` header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Accept privileged calls without a key. Local and test servers only.
    #[serde(default)]
    pub skip_auth: bool,

    /// Largest accepted request body
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7420
}

fn default_max_request_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            host: default_host(),
            port: default_port(),
            data_dir: None,
            api_key: None,
            skip_auth: false,
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

impl ServerSettings {
    pub fn layout(&self) -> ServerLayout {
        match &self.data_dir {
            Some(dir) => ServerLayout::new(dir.clone()),
            None => ServerLayout::default(),
        }
    }

    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::from(k.clone()))
    }

    /// A server with neither a key nor `skip_auth` would reject every
    /// privileged call, so refuse to start it.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.api_key().is_none() && !self.skip_auth {
            return Err(EngineError::ConfigError(
                "api_key is required unless skip_auth is set".to_string(),
            ));
        }
        if self.max_request_bytes < rpc_contract::REQUEST_SIZE_CEILING * 2 {
            return Err(EngineError::ConfigError(format!(
                "max_request_bytes must be at least {}",
                rpc_contract::REQUEST_SIZE_CEILING * 2
            )));
        }
        Ok(())
    }
}

/// Client deploy settings, the `deploy-settings` block of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeploySettings {
    pub project_name: String,

    /// Server URL; a bare origin gets the RPC endpoint path appended
    pub dest_url: String,

    #[serde(default)]
    pub web_static_dir: Option<String>,

    #[serde(default)]
    pub update_in_place: bool,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound on files uploaded at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    rpc_contract::DEFAULT_UPLOAD_CONCURRENCY
}

impl DeploySettings {
    pub const FILE_NAME: &'static str = "goob-deploy.json";

    /// Parse settings text; the same text travels to the server as the
    /// deployment's source config.
    pub fn from_text(text: &str) -> Result<Self, EngineError> {
        let settings: DeploySettings = serde_json::from_str(text)
            .map_err(|e| EngineError::ConfigError(format!("{}: {}", Self::FILE_NAME, e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `goob-deploy.json` from a project root, returning the parsed
    /// settings and the raw text.
    pub async fn load(project_root: &Dir) -> Result<(Self, String), EngineError> {
        let file = project_root.file(Self::FILE_NAME);
        if !file.exists().await {
            return Err(EngineError::ConfigError(format!(
                "{} not found in {}",
                Self::FILE_NAME,
                project_root.path().display()
            )));
        }
        let text = file.read_string().await?;
        let settings = Self::from_text(&text)?;
        Ok((settings, text))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.project_name.trim().is_empty() {
            return Err(EngineError::ConfigError("project-name is empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(EngineError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        self.endpoint()?;
        Ok(())
    }

    /// The JSON-RPC endpoint derived from `dest-url`
    pub fn endpoint(&self) -> Result<Url, EngineError> {
        let mut url = Url::parse(&self.dest_url)
            .map_err(|e| EngineError::ConfigError(format!("dest-url {}: {}", self.dest_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EngineError::ConfigError(format!(
                "dest-url must be http(s): {}",
                self.dest_url
            )));
        }
        if url.path() == "/" || url.path().is_empty() {
            url.set_path(rpc_contract::RPC_PATH);
        }
        Ok(url)
    }

    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::from(k.clone()))
    }
}
