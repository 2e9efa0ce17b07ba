//! Application configuration options

use secrecy::SecretString;

use crate::storage::layout::ServerLayout;
use crate::storage::settings::ServerSettings;

/// Deployment server options
#[derive(Debug)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Largest accepted request body
    pub max_request_bytes: usize,

    /// Data directory layout
    pub layout: ServerLayout,

    /// Shared secret for privileged methods
    pub api_key: Option<SecretString>,

    /// Let privileged methods through when no key is configured
    pub skip_auth: bool,
}

impl ServerOptions {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_request_bytes: settings.max_request_bytes,
            layout: settings.layout(),
            api_key: settings.api_key(),
            skip_auth: settings.skip_auth,
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}
