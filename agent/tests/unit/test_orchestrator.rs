//! Update pipeline ordering and failure policy

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio_test::assert_ok;

use updater_agent::archive::{EncodingCandidates, ExtractReport, Extractor};
use updater_agent::deploy::fsm::UpdateState;
use updater_agent::deploy::{
    ArchiveSource, ContentStore, ControlAction, LocalContentStore, UpdateOrchestrator,
};
use updater_agent::errors::AgentError;
use updater_agent::filesys::exclusion::ExclusionSet;
use updater_agent::filesys::snapshot::{Snapshot, SnapshotManager};
use updater_agent::filesys::tree::{BulkReport, CopyStats};
use updater_agent::lifecycle::{LifecycleState, SettleOptions};
use updater_agent::targets::{DeploymentTarget, TargetKind};

use crate::support::{build_zip, calls, new_log, read_tree, write_tree, CallLog, FakeController};

/// Content store that only records calls
struct RecordingStore {
    log: CallLog,
    fail_backup: bool,
    clear_delay: Duration,
}

impl ContentStore for RecordingStore {
    fn backup(
        &self,
        _source: &Path,
        backup_base: &Path,
        name: &str,
        _exclusions: &ExclusionSet,
    ) -> Result<Snapshot, AgentError> {
        self.log.lock().unwrap().push(format!("backup:{}", name));
        if self.fail_backup {
            return Err(AgentError::BackupError("disk full".to_string()));
        }
        Ok(Snapshot {
            name: format!("{}_snapshot", name),
            path: backup_base.join(format!("{}_snapshot", name)),
            created_at: Local::now().naive_local(),
            stats: CopyStats::default(),
        })
    }

    fn clear(&self, _target: &Path, _exclusions: &ExclusionSet) -> Result<BulkReport, AgentError> {
        std::thread::sleep(self.clear_delay);
        self.log.lock().unwrap().push("clear".to_string());
        Ok(BulkReport::default())
    }

    fn extract(&self, _archive: &ArchiveSource, _dest: &Path) -> Result<ExtractReport, AgentError> {
        self.log.lock().unwrap().push("extract".to_string());
        Ok(ExtractReport {
            files: 0,
            directories: 0,
            encoding: "UTF-8".to_string(),
        })
    }
}

fn target(name: &str, content_dir: &Path, backup_dir: Option<&Path>, controller: FakeController) -> Arc<DeploymentTarget> {
    Arc::new(DeploymentTarget {
        name: name.to_string(),
        kind: TargetKind::AppPool,
        content_dir: content_dir.to_path_buf(),
        backup_dir: backup_dir.map(Path::to_path_buf),
        exclusions: ExclusionSet::new(["uploads"]),
        controller: Arc::new(controller),
    })
}

fn recording(log: &CallLog, fail_backup: bool) -> UpdateOrchestrator {
    recording_with_clear_delay(log, fail_backup, Duration::ZERO)
}

fn recording_with_clear_delay(log: &CallLog, fail_backup: bool, clear_delay: Duration) -> UpdateOrchestrator {
    UpdateOrchestrator::new(
        Arc::new(RecordingStore {
            log: log.clone(),
            fail_backup,
            clear_delay,
        }),
        SettleOptions::immediate(),
    )
}

fn archive() -> ArchiveSource {
    ArchiveSource::Memory(build_zip(&[("index.html", b"new")]))
}

#[tokio::test]
async fn test_pipeline_order() {
    let tmp = tempfile::tempdir().unwrap();
    let log = new_log();
    let orchestrator = recording(&log, false);
    let site = target(
        "site-a",
        tmp.path(),
        Some(&tmp.path().join("backups")),
        FakeController::new("site-a", log.clone()),
    );

    let outcome = assert_ok!(orchestrator.update(site, archive()).await);

    assert_eq!(
        calls(&log),
        vec!["stop:site-a", "backup:site-a", "clear", "extract", "start:site-a"]
    );
    assert_eq!(outcome.state, LifecycleState::Running);
    assert_eq!(outcome.steps.last(), Some(&UpdateState::Done));
    assert!(outcome.steps.contains(&UpdateState::BackingUp));
    assert!(outcome.backup.is_some());
}

#[tokio::test]
async fn test_backup_failure_prevents_clear_and_extract() {
    let tmp = tempfile::tempdir().unwrap();
    let log = new_log();
    let orchestrator = recording(&log, true);
    let site = target(
        "site-a",
        tmp.path(),
        Some(&tmp.path().join("backups")),
        FakeController::new("site-a", log.clone()),
    );

    let err = orchestrator.update(site, archive()).await.unwrap_err();

    assert!(matches!(&err, AgentError::PipelineError { step, .. } if step == "backup"));
    assert!(matches!(err.root(), AgentError::BackupError(_)));
    assert_eq!(calls(&log), vec!["stop:site-a", "backup:site-a"]);
}

#[tokio::test]
async fn test_stop_failure_aborts_before_files() {
    let tmp = tempfile::tempdir().unwrap();
    let log = new_log();
    let orchestrator = recording(&log, false);
    let controller = FakeController::new("site-a", log.clone())
        .failing_stop(AgentError::NotFound("app pool site-a".to_string()));
    let site = target("site-a", tmp.path(), None, controller);

    let err = orchestrator.update(site, archive()).await.unwrap_err();

    assert!(matches!(&err, AgentError::PipelineError { step, .. } if step == "stop"));
    assert!(matches!(err.root(), AgentError::NotFound(_)));
    assert_eq!(calls(&log), vec!["stop:site-a"]);
}

#[tokio::test]
async fn test_no_backup_dir_skips_backup() {
    let tmp = tempfile::tempdir().unwrap();
    let log = new_log();
    let orchestrator = recording(&log, false);
    let site = target("site-a", tmp.path(), None, FakeController::new("site-a", log.clone()));

    let outcome = assert_ok!(orchestrator.update(site, archive()).await);

    assert_eq!(calls(&log), vec!["stop:site-a", "clear", "extract", "start:site-a"]);
    assert!(outcome.backup.is_none());
    assert!(!outcome.steps.contains(&UpdateState::BackingUp));
}

#[tokio::test]
async fn test_missing_content_dir_skips_backup() {
    let tmp = tempfile::tempdir().unwrap();
    let log = new_log();
    let orchestrator = recording(&log, false);
    let site = target(
        "site-a",
        &tmp.path().join("not-yet-deployed"),
        Some(&tmp.path().join("backups")),
        FakeController::new("site-a", log.clone()),
    );

    assert_ok!(orchestrator.update(site, archive()).await);
    assert_eq!(calls(&log), vec!["stop:site-a", "clear", "extract", "start:site-a"]);
}

#[tokio::test]
async fn test_same_target_updates_do_not_interleave() {
    let tmp = tempfile::tempdir().unwrap();
    let log = new_log();
    let orchestrator = recording(&log, false);
    let controller = FakeController::new("site-a", log.clone()).slow_stop(Duration::from_millis(20));
    let site = target("site-a", tmp.path(), None, controller);

    let (first, second) = tokio::join!(
        orchestrator.update(site.clone(), archive()),
        orchestrator.update(site.clone(), archive()),
    );
    assert_ok!(first);
    assert_ok!(second);

    let one_run = ["stop:site-a", "clear", "extract", "start:site-a"];
    let expected: Vec<&str> = one_run.iter().chain(one_run.iter()).copied().collect();
    assert_eq!(calls(&log), expected);
}

#[tokio::test]
async fn test_abandoned_caller_does_not_cancel_update() {
    let tmp = tempfile::tempdir().unwrap();
    let log = new_log();
    let orchestrator = recording_with_clear_delay(&log, false, Duration::from_millis(300));
    let site = target("site-a", tmp.path(), None, FakeController::new("site-a", log.clone()));

    // Caller gives up while clear is still running
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        orchestrator.update(site.clone(), archive()),
    )
    .await;
    assert!(abandoned.is_err());

    // The next caller queues behind the detached run instead of racing it
    assert_ok!(orchestrator.update(site, archive()).await);

    let one_run = ["stop:site-a", "clear", "extract", "start:site-a"];
    let expected: Vec<&str> = one_run.iter().chain(one_run.iter()).copied().collect();
    assert_eq!(calls(&log), expected);
    assert!(!orchestrator.locks().is_locked("site-a").await);
}

#[tokio::test]
async fn test_full_pipeline_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let content = tmp.path().join("site");
    let backups = tmp.path().join("backups");
    write_tree(
        &content,
        &[("index.html", "old"), ("stale.js", "gone"), ("uploads/avatar.png", "png")],
    );

    let log = new_log();
    let store = LocalContentStore::new(
        SnapshotManager::default(),
        Extractor::new(EncodingCandidates::with_host(None)),
    );
    let orchestrator = UpdateOrchestrator::new(Arc::new(store), SettleOptions::immediate());
    let site = target("site-a", &content, Some(&backups), FakeController::new("site-a", log.clone()));

    let payload = ArchiveSource::Memory(build_zip(&[
        ("index.html", b"<html>v2</html>"),
        ("js/app.js", b"console.log(2)"),
    ]));

    assert_ok!(orchestrator.update(site.clone(), payload.clone()).await);
    let first = read_tree(&content);
    assert_ok!(orchestrator.update(site.clone(), payload).await);
    let second = read_tree(&content);

    assert_eq!(first, second);
    assert_eq!(
        first.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["index.html", "js/app.js", "uploads/avatar.png"]
    );
    assert_eq!(first["index.html"], b"<html>v2</html>".to_vec());
}

#[tokio::test]
async fn test_control_start_and_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let log = new_log();
    let orchestrator = recording(&log, false);
    let site = target("site-a", tmp.path(), None, FakeController::new("site-a", log.clone()));

    let stopped = assert_ok!(
        orchestrator
            .control(site.clone(), ControlAction::Stop)
            .await
    );
    assert_eq!(stopped.state, LifecycleState::Stopped);

    let started = assert_ok!(
        orchestrator
            .control(site, ControlAction::Start)
            .await
    );
    assert_eq!(started.state, LifecycleState::Running);
    assert_eq!(calls(&log), vec!["stop:site-a", "start:site-a"]);
}
