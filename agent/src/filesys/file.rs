//! File handles used for settings and staged uploads

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::AgentError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A uniquely named file in the system temp directory
    pub fn temp(prefix: &str, extension: &str) -> Self {
        let name = format!("{}-{}.{}", prefix, uuid::Uuid::new_v4(), extension);
        Self::new(std::env::temp_dir().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read and parse the file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, AgentError> {
        let contents = fs::read_to_string(&self.path).await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Create (or truncate) the file for streaming writes, creating parents
    pub async fn create(&self) -> Result<fs::File, AgentError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(fs::File::create(&self.path).await?)
    }

    /// Write bytes to the file in one go
    pub async fn write_bytes(&self, contents: &[u8]) -> Result<(), AgentError> {
        let mut file = self.create().await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Delete the file if present
    pub async fn delete(&self) -> Result<(), AgentError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
