//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::file::File;

/// Environment variable overriding the settings file location
pub const CONFIG_ENV_VAR: &str = "UPDATER_AGENT_CONFIG";

/// Storage layout for the agent
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Default settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Default log directory
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Settings file from an explicit path, the environment, or the default
    pub fn resolve_settings_file(&self, explicit: Option<&str>) -> File {
        explicit
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
            .filter(|path| !path.trim().is_empty())
            .map(File::new)
            .unwrap_or_else(|| self.settings_file())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/updater-agent");

        #[cfg(not(target_os = "linux"))]
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".updater-agent");

        Self::new(base_dir)
    }
}

#[cfg(not(target_os = "linux"))]
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}
