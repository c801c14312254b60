//! Deployment targets and the registry resolving them by name

pub mod registry;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::filesys::exclusion::ExclusionSet;
use crate::lifecycle::LifecycleController;

pub use registry::TargetRegistry;

/// Which runtime backend a target is hosted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    AppPool,
    Process,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::AppPool => write!(f, "app pool"),
            TargetKind::Process => write!(f, "process"),
        }
    }
}

/// A named deployable unit. Built once at start-up and never mutated.
pub struct DeploymentTarget {
    pub name: String,
    pub kind: TargetKind,
    pub content_dir: PathBuf,
    /// Snapshot base directory; `None` disables backups
    pub backup_dir: Option<PathBuf>,
    pub exclusions: ExclusionSet,
    pub controller: Arc<dyn LifecycleController>,
}

impl fmt::Debug for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentTarget")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("content_dir", &self.content_dir)
            .field("backup_dir", &self.backup_dir)
            .field("exclusions", &self.exclusions)
            .field("controller", &self.controller.describe())
            .finish()
    }
}
