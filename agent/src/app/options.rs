//! Application configuration options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::ServerSettings;

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Server configuration
    pub server: ServerOptions,
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerSettings::default().into()
    }
}

impl From<ServerSettings> for ServerOptions {
    fn from(settings: ServerSettings) -> Self {
        Self {
            host: settings.host,
            port: settings.port,
            max_upload_bytes: settings.max_upload_bytes,
        }
    }
}
