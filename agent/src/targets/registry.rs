//! Name to target resolution

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::AgentError;
use crate::lifecycle::app_pool::AppPoolController;
use crate::lifecycle::supervisor::SupervisorController;
use crate::lifecycle::ControlOptions;
use crate::storage::settings::Settings;
use crate::targets::{DeploymentTarget, TargetKind};

/// Immutable lookup table of configured targets
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Arc<DeploymentTarget>>,
}

impl TargetRegistry {
    /// Build every target from settings, wiring each to its controller
    pub fn from_settings(settings: &Settings, control: &ControlOptions) -> Result<Self, AgentError> {
        let mut targets = Vec::with_capacity(settings.app_pools.len() + settings.processes.len());

        for pool in &settings.app_pools {
            let controller = AppPoolController::new(
                control.app_pool_manager_path.clone(),
                pool.name.clone(),
                control.command_timeout,
            );
            targets.push(DeploymentTarget {
                name: pool.name.clone(),
                kind: TargetKind::AppPool,
                content_dir: pool.content_dir.clone(),
                backup_dir: pool.backup_dir.clone(),
                exclusions: pool.exclude.clone(),
                controller: Arc::new(controller),
            });
        }

        for process in &settings.processes {
            let controller = SupervisorController::new(
                control.supervisor_path.clone(),
                process.process_id.clone(),
                control.command_timeout,
            )
            .with_require_elevation(control.require_elevation)
            .with_save_after_start(control.save_after_start);
            targets.push(DeploymentTarget {
                name: process.name.clone(),
                kind: TargetKind::Process,
                content_dir: process.content_dir.clone(),
                backup_dir: process.backup_dir.clone(),
                exclusions: process.exclude.clone(),
                controller: Arc::new(controller),
            });
        }

        Self::from_targets(targets)
    }

    /// Build from already constructed targets; names must be unique
    pub fn from_targets(targets: impl IntoIterator<Item = DeploymentTarget>) -> Result<Self, AgentError> {
        let mut map = BTreeMap::new();
        for target in targets {
            if map.contains_key(&target.name) {
                return Err(AgentError::ConfigError(format!(
                    "Target {} is defined more than once",
                    target.name
                )));
            }
            map.insert(target.name.clone(), Arc::new(target));
        }
        Ok(Self { targets: map })
    }

    /// Look up a target by exact name
    pub fn resolve(&self, name: &str) -> Result<Arc<DeploymentTarget>, AgentError> {
        self.targets
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(format!("{} is not defined", name)))
    }

    /// Look up a target that must be of `kind`. A target of the other kind
    /// is reported as not defined.
    pub fn resolve_kind(&self, name: &str, kind: TargetKind) -> Result<Arc<DeploymentTarget>, AgentError> {
        match self.resolve(name)? {
            target if target.kind == kind => Ok(target),
            _ => Err(AgentError::NotFound(format!("{} {} is not defined", kind, name))),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeploymentTarget>> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
