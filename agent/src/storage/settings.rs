//! Settings file management

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::archive::encoding::encoding_for_label;
use crate::errors::AgentError;
use crate::filesys::exclusion::ExclusionSet;
use crate::filesys::snapshot::DEFAULT_RETENTION_DAYS;
use crate::lifecycle::app_pool::DEFAULT_APPCMD_PATH;
use crate::lifecycle::{ControlOptions, SettleOptions};
use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Per-operation signing secrets
    #[serde(default)]
    pub auth: AuthSettings,

    /// Targets backed by an application pool
    #[serde(default)]
    pub app_pools: Vec<AppPoolSettings>,

    /// Targets backed by a supervised process
    #[serde(default)]
    pub processes: Vec<ProcessSettings>,

    /// Control backend configuration
    #[serde(default)]
    pub control: ControlSettings,

    /// Days a backup snapshot is kept
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Encoding label used as the host default for archive entry names
    #[serde(default)]
    pub host_code_page: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            auth: AuthSettings::default(),
            app_pools: Vec::new(),
            processes: Vec::new(),
            control: ControlSettings::default(),
            retention_days: DEFAULT_RETENTION_DAYS,
            host_code_page: None,
        }
    }
}

impl Settings {
    /// Check the settings for mistakes that would only surface per request
    pub fn validate(&self) -> Result<(), AgentError> {
        let mut names = HashSet::new();
        let all = self
            .app_pools
            .iter()
            .map(|p| (&p.name, &p.content_dir))
            .chain(self.processes.iter().map(|p| (&p.name, &p.content_dir)));

        for (name, content_dir) in all {
            if name.trim().is_empty() {
                return Err(AgentError::ConfigError("Target name is empty".to_string()));
            }
            if content_dir.as_os_str().is_empty() {
                return Err(AgentError::ConfigError(format!(
                    "Target {} has no content_dir",
                    name
                )));
            }
            if !names.insert(name.as_str()) {
                return Err(AgentError::ConfigError(format!(
                    "Target {} is defined more than once",
                    name
                )));
            }
        }

        for process in &self.processes {
            if process.process_id.trim().is_empty() {
                return Err(AgentError::ConfigError(format!(
                    "Process target {} has no process_id",
                    process.name
                )));
            }
        }

        if let Some(label) = &self.host_code_page {
            if encoding_for_label(label).is_none() {
                return Err(AgentError::ConfigError(format!(
                    "Unknown host_code_page encoding: {}",
                    label
                )));
            }
        }

        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    500 * 1024 * 1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Request signing settings
#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    /// Fixed suffix of the signed string
    #[serde(default = "default_signature_suffix")]
    pub signature_suffix: String,

    /// One secret per operation
    #[serde(default)]
    pub secrets: OperationSecrets,
}

fn default_signature_suffix() -> String {
    "Updater".to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            signature_suffix: default_signature_suffix(),
            secrets: OperationSecrets::default(),
        }
    }
}

/// Secrets gating each operation. An operation without a secret rejects
/// every request.
#[derive(Debug, Default, Deserialize)]
pub struct OperationSecrets {
    #[serde(default)]
    pub update: Option<SecretString>,

    #[serde(default)]
    pub start: Option<SecretString>,

    #[serde(default)]
    pub stop: Option<SecretString>,

    #[serde(default)]
    pub host_info: Option<SecretString>,
}

/// An application pool target
#[derive(Debug, Clone, Deserialize)]
pub struct AppPoolSettings {
    /// App pool name, also the target name
    pub name: String,

    /// Directory the site is served from
    pub content_dir: PathBuf,

    /// Where snapshots go; absent or empty disables backups
    #[serde(default, deserialize_with = "deserialize_optional_path")]
    pub backup_dir: Option<PathBuf>,

    /// Items preserved across backup and clear
    #[serde(default)]
    pub exclude: ExclusionSet,
}

/// A supervised process target
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSettings {
    /// Target name
    pub name: String,

    /// Supervisor id or name of the process
    pub process_id: String,

    /// Directory the process runs from
    pub content_dir: PathBuf,

    /// Where snapshots go; absent or empty disables backups
    #[serde(default, deserialize_with = "deserialize_optional_path")]
    pub backup_dir: Option<PathBuf>,

    /// Items preserved across backup and clear
    #[serde(default = "default_process_exclusions")]
    pub exclude: ExclusionSet,
}

fn default_process_exclusions() -> ExclusionSet {
    ExclusionSet::new(["node_modules"])
}

fn deserialize_optional_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from))
}

/// Control backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct ControlSettings {
    #[serde(default = "default_appcmd_path")]
    pub app_pool_manager_path: PathBuf,

    #[serde(default = "default_supervisor_path")]
    pub supervisor_path: PathBuf,

    #[serde(default = "default_true")]
    pub require_elevation: bool,

    #[serde(default)]
    pub save_after_start: bool,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    #[serde(default)]
    pub settle: SettleSettings,
}

fn default_appcmd_path() -> PathBuf {
    PathBuf::from(DEFAULT_APPCMD_PATH)
}

fn default_supervisor_path() -> PathBuf {
    PathBuf::from("pm2")
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            app_pool_manager_path: default_appcmd_path(),
            supervisor_path: default_supervisor_path(),
            require_elevation: true,
            save_after_start: false,
            command_timeout_secs: default_command_timeout_secs(),
            settle: SettleSettings::default(),
        }
    }
}

impl ControlSettings {
    pub fn to_options(&self) -> ControlOptions {
        ControlOptions {
            app_pool_manager_path: self.app_pool_manager_path.clone(),
            supervisor_path: self.supervisor_path.clone(),
            require_elevation: self.require_elevation,
            save_after_start: self.save_after_start,
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            settle: self.settle.to_options(),
        }
    }
}

/// Settle polling settings, in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct SettleSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_settle_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_fallback_delay_ms")]
    pub fallback_delay_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_settle_timeout_ms() -> u64 {
    10_000
}

fn default_fallback_delay_ms() -> u64 {
    1_000
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_settle_timeout_ms(),
            fallback_delay_ms: default_fallback_delay_ms(),
        }
    }
}

impl SettleSettings {
    pub fn to_options(&self) -> SettleOptions {
        SettleOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            fallback_delay: Duration::from_millis(self.fallback_delay_ms),
        }
    }
}
