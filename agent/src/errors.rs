//! Error types for the updater agent

use thiserror::Error;

/// Main error type for the updater agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("Missing signature or API key")]
    AuthMissing,

    #[error("Invalid signature")]
    AuthInvalid,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Lifecycle error: {0}")]
    LifecycleError(String),

    #[error("Backup failed: {0}")]
    BackupError(String),

    #[error("Clear failed: {0}")]
    ClearError(String),

    #[error("Extraction failed: {0}")]
    ExtractError(String),

    /// A pipeline step failed; `source` is the underlying cause.
    #[error("{step} failed: {source}")]
    PipelineError {
        step: String,
        #[source]
        source: Box<AgentError>,
    },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Wrap an error as the failure of a named pipeline step
    pub fn at_step(step: impl Into<String>, source: AgentError) -> Self {
        AgentError::PipelineError {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// The innermost cause, skipping pipeline wrappers
    pub fn root(&self) -> &AgentError {
        match self {
            AgentError::PipelineError { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(err: tokio::task::JoinError) -> Self {
        AgentError::Internal(format!("Blocking task failed: {}", err))
    }
}
