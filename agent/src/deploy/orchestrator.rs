//! Update pipeline: stop, backup, clear, extract, start

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::archive::ExtractReport;
use crate::deploy::content::{ArchiveSource, ContentStore};
use crate::deploy::fsm::{UpdateEvent, UpdateFsm, UpdateState};
use crate::deploy::locks::TargetLocks;
use crate::errors::AgentError;
use crate::filesys::tree::BulkReport;
use crate::lifecycle::{settle, LifecycleState, SettleOptions};
use crate::targets::{DeploymentTarget, TargetKind};

/// Content types accepted for an uploaded archive
const ZIP_CONTENT_TYPES: [&str; 2] = ["application/zip", "application/x-zip-compressed"];

/// Reject uploads whose declared content type is not a zip variant
pub fn check_archive_content_type(content_type: Option<&str>) -> Result<(), AgentError> {
    let content_type = content_type.unwrap_or_default().trim().to_ascii_lowercase();
    if ZIP_CONTENT_TYPES
        .iter()
        .any(|accepted| content_type.starts_with(accepted))
    {
        Ok(())
    } else {
        Err(AgentError::ValidationError(format!(
            "Unsupported archive content type: {:?}",
            content_type
        )))
    }
}

/// Result of a completed update
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub target: String,
    pub kind: TargetKind,
    pub message: String,
    pub content_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    pub cleared: BulkReport,
    pub extracted: ExtractReport,
    pub state: LifecycleState,
    pub steps: Vec<UpdateState>,
}

/// Start or stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Stop,
}

impl ControlAction {
    fn expected(&self) -> LifecycleState {
        match self {
            ControlAction::Start => LifecycleState::Running,
            ControlAction::Stop => LifecycleState::Stopped,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
        }
    }
}

/// Result of a start or stop request
#[derive(Debug, Clone, Serialize)]
pub struct ControlOutcome {
    pub target: String,
    pub kind: TargetKind,
    pub message: String,
    pub state: LifecycleState,
}

/// Sequences the update pipeline against one target at a time.
///
/// Every pipeline and control call runs in its own task that owns the
/// target's lock, so dropping the caller never leaves a target half updated.
pub struct UpdateOrchestrator {
    pipeline: Pipeline,
    locks: Arc<TargetLocks>,
}

impl UpdateOrchestrator {
    pub fn new(store: Arc<dyn ContentStore>, settle: SettleOptions) -> Self {
        Self {
            pipeline: Pipeline { store, settle },
            locks: Arc::new(TargetLocks::new()),
        }
    }

    pub fn locks(&self) -> &TargetLocks {
        &self.locks
    }

    /// Run the full pipeline. Any step failure aborts it with a
    /// `PipelineError` naming the step; the target may be left stopped.
    pub async fn update(
        &self,
        target: Arc<DeploymentTarget>,
        archive: ArchiveSource,
    ) -> Result<UpdateOutcome, AgentError> {
        let pipeline = self.pipeline.clone();
        let locks = self.locks.clone();

        tokio::spawn(async move {
            let _guard = locks.acquire(&target.name).await;
            pipeline.update(&target, archive).await
        })
        .await?
    }

    /// Start or stop a target outside of an update
    pub async fn control(
        &self,
        target: Arc<DeploymentTarget>,
        action: ControlAction,
    ) -> Result<ControlOutcome, AgentError> {
        let pipeline = self.pipeline.clone();
        let locks = self.locks.clone();

        tokio::spawn(async move {
            let _guard = locks.acquire(&target.name).await;
            pipeline.control(&target, action).await
        })
        .await?
    }
}

#[derive(Clone)]
struct Pipeline {
    store: Arc<dyn ContentStore>,
    settle: SettleOptions,
}

impl Pipeline {
    async fn update(
        &self,
        target: &Arc<DeploymentTarget>,
        archive: ArchiveSource,
    ) -> Result<UpdateOutcome, AgentError> {
        let mut fsm = UpdateFsm::new();

        info!(target = %target.name, kind = %target.kind, "Update started");
        match self.run(target, archive, &mut fsm).await {
            Ok(outcome) => {
                info!(target = %target.name, state = %outcome.state, "Update complete");
                Ok(outcome)
            }
            Err(e) => {
                if let Err(err) = fsm.process(UpdateEvent::Fail(e.to_string())) {
                    warn!("{}", err);
                }
                warn!(
                    target = %target.name,
                    steps = ?fsm.history(),
                    "Update failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        target: &Arc<DeploymentTarget>,
        archive: ArchiveSource,
        fsm: &mut UpdateFsm,
    ) -> Result<UpdateOutcome, AgentError> {
        let controller = target.controller.clone();

        advance(fsm, UpdateEvent::Stop)?;
        controller
            .stop()
            .await
            .map_err(|e| AgentError::at_step("stop", e))?;
        settle(controller.as_ref(), LifecycleState::Stopped, &self.settle).await;
        info!(target = %target.name, "Stopped {}", controller.describe());

        let backup = match &target.backup_dir {
            Some(base) if target.content_dir.is_dir() => {
                advance(fsm, UpdateEvent::Backup)?;
                let store = self.store.clone();
                let source = target.content_dir.clone();
                let base = base.clone();
                let name = target.name.clone();
                let exclusions = target.exclusions.clone();
                let snapshot = blocking("backup", move || {
                    store.backup(&source, &base, &name, &exclusions)
                })
                .await?;
                Some(snapshot.path)
            }
            Some(_) => {
                info!(
                    target = %target.name,
                    "Content directory {} does not exist, nothing to back up",
                    target.content_dir.display()
                );
                None
            }
            None => None,
        };

        advance(fsm, UpdateEvent::Clear)?;
        let store = self.store.clone();
        let content_dir = target.content_dir.clone();
        let exclusions = target.exclusions.clone();
        let cleared = blocking("clear", move || store.clear(&content_dir, &exclusions)).await?;
        cleared.log_failures("Clear");
        info!(
            target = %target.name,
            removed = cleared.removed,
            preserved = ?cleared.preserved,
            "Content cleared"
        );

        advance(fsm, UpdateEvent::Extract)?;
        let store = self.store.clone();
        let content_dir = target.content_dir.clone();
        let extracted = blocking("extract", move || store.extract(&archive, &content_dir)).await?;
        info!(
            target = %target.name,
            files = extracted.files,
            encoding = %extracted.encoding,
            "Archive extracted"
        );

        advance(fsm, UpdateEvent::Start)?;
        controller
            .start()
            .await
            .map_err(|e| AgentError::at_step("start", e))?;
        let state = settle(controller.as_ref(), LifecycleState::Running, &self.settle).await;

        advance(fsm, UpdateEvent::Finish)?;

        Ok(UpdateOutcome {
            target: target.name.clone(),
            kind: target.kind,
            message: format!("Updated {} {}", target.kind, target.name),
            content_dir: target.content_dir.clone(),
            backup,
            cleared,
            extracted,
            state,
            steps: fsm.history().to_vec(),
        })
    }

    async fn control(
        &self,
        target: &Arc<DeploymentTarget>,
        action: ControlAction,
    ) -> Result<ControlOutcome, AgentError> {
        let controller = target.controller.clone();

        let result = match action {
            ControlAction::Start => controller.start().await,
            ControlAction::Stop => controller.stop().await,
        };
        result.map_err(|e| AgentError::at_step(action.as_str(), e))?;

        let state = settle(controller.as_ref(), action.expected(), &self.settle).await;
        info!(target = %target.name, state = %state, "{} {} requested", action.as_str(), target.name);

        Ok(ControlOutcome {
            target: target.name.clone(),
            kind: target.kind,
            message: format!("{} {} {}", action.as_str(), target.kind, target.name),
            state,
        })
    }
}

fn advance(fsm: &mut UpdateFsm, event: UpdateEvent) -> Result<(), AgentError> {
    fsm.process(event).map_err(AgentError::Internal)
}

/// Run a blocking filesystem step on the blocking pool
async fn blocking<T, F>(step: &str, f: F) -> Result<T, AgentError>
where
    F: FnOnce() -> Result<T, AgentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(AgentError::from)
        .and_then(|result| result)
        .map_err(|e| AgentError::at_step(step, e))
}
