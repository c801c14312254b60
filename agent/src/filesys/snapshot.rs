//! Directory snapshots, retention pruning and exclusion-aware clearing

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::AgentError;
use crate::filesys::exclusion::ExclusionSet;
use crate::filesys::tree::{copy_tree, remove_file_forced, remove_tree_forced, BulkReport, CopyStats};

/// Default number of days a snapshot is kept
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Timestamp format of the snapshot directory suffix
const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A timestamped copy of a target's content directory
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Directory name, `{name}_{yyyyMMdd_HHmmss}`
    pub name: String,

    /// Absolute path of the snapshot directory
    pub path: PathBuf,

    /// Local time the snapshot was taken
    pub created_at: NaiveDateTime,

    /// Copy totals
    pub stats: CopyStats,
}

/// Outcome of a retention sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    /// Snapshot directories deleted
    pub deleted: Vec<PathBuf>,

    /// Snapshot directories whose deletion failed
    pub failures: BulkReport,
}

/// Snapshot directory name for a target at a point in time
pub fn snapshot_name(name: &str, at: NaiveDateTime) -> String {
    format!("{}_{}", name, at.format(SNAPSHOT_TIMESTAMP_FORMAT))
}

/// Parse the `yyyyMMdd` segment immediately following `{prefix}_`
pub fn parse_snapshot_date(dir_name: &str, prefix: &str) -> Option<NaiveDate> {
    let rest = dir_name.strip_prefix(prefix)?.strip_prefix('_')?;
    let date = rest.get(..8)?;
    if !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year = date[..4].parse::<i32>().ok()?;
    let month = date[4..6].parse::<u32>().ok()?;
    let day = date[6..8].parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Takes snapshots and enforces the retention window
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    retention_days: u32,
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

impl SnapshotManager {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Copy `source` into a fresh `backup_base/{name}_{timestamp}` directory,
    /// honoring `exclusions` at every depth, then prune old snapshots.
    ///
    /// Pruning failures are logged and never fail the backup.
    pub fn backup(
        &self,
        source: &Path,
        backup_base: &Path,
        name: &str,
        exclusions: &ExclusionSet,
    ) -> Result<Snapshot, AgentError> {
        self.backup_at(source, backup_base, name, exclusions, Local::now().naive_local())
    }

    /// `backup` with an explicit clock reading
    pub fn backup_at(
        &self,
        source: &Path,
        backup_base: &Path,
        name: &str,
        exclusions: &ExclusionSet,
        now: NaiveDateTime,
    ) -> Result<Snapshot, AgentError> {
        if !source.is_dir() {
            return Err(AgentError::NotFound(format!(
                "Source directory does not exist: {}",
                source.display()
            )));
        }

        fs::create_dir_all(backup_base).map_err(|e| {
            AgentError::BackupError(format!(
                "Unable to create backup directory {}: {}",
                backup_base.display(),
                e
            ))
        })?;

        let snapshot_dir_name = snapshot_name(name, now);
        let path = backup_base.join(&snapshot_dir_name);
        info!(source = %source.display(), snapshot = %path.display(), "Backing up directory");

        let stats = copy_tree(source, &path, exclusions).map_err(|e| match e {
            AgentError::NotFound(msg) => AgentError::NotFound(msg),
            other => AgentError::BackupError(other.to_string()),
        })?;

        info!(
            files = stats.files,
            bytes = stats.bytes,
            "Backup complete: {}",
            snapshot_dir_name
        );

        let pruned = self.prune_older_than(backup_base, name, now);
        pruned.failures.log_failures("Retention sweep");

        Ok(Snapshot {
            name: snapshot_dir_name,
            path,
            created_at: now,
            stats,
        })
    }

    /// Delete snapshots of `prefix` whose date segment is strictly older than
    /// `now - retention_days`.
    ///
    /// Names that do not parse as a date are left untouched. Each deletion
    /// fails independently; nothing here returns an error.
    pub fn prune_older_than(
        &self,
        backup_base: &Path,
        prefix: &str,
        now: NaiveDateTime,
    ) -> PruneReport {
        let mut report = PruneReport::default();

        let entries = match fs::read_dir(backup_base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(path = %backup_base.display(), error = %e, "Unable to list backups for pruning");
                return report;
            }
        };

        let cutoff = now - Duration::days(i64::from(self.retention_days));

        for entry in entries.flatten() {
            // Never follow a link out of the backup directory
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let path = entry.path();

            let Some(dir_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };

            let Some(date) = parse_snapshot_date(&dir_name, prefix) else {
                if dir_name.starts_with(&format!("{}_", prefix)) {
                    debug!(dir = %dir_name, "Backup name has no parsable date, keeping it");
                }
                continue;
            };

            if date.and_hms_opt(0, 0, 0).is_some_and(|taken| taken < cutoff) {
                let sub = remove_tree_forced(&path);
                if path.exists() {
                    report.failures.merge(sub);
                } else {
                    sub.log_failures("Retention sweep");
                    info!(path = %path.display(), "Deleted expired backup");
                    report.deleted.push(path);
                }
            }
        }

        report
    }

    /// Delete everything under `target` except top-level items named in
    /// `exclusions`. A missing directory is a no-op.
    ///
    /// Individual deletion failures are collected in the report; only a
    /// failure to list `target` itself is an error.
    pub fn clear(&self, target: &Path, exclusions: &ExclusionSet) -> Result<BulkReport, AgentError> {
        clear_directory(target, exclusions)
    }
}

/// Free-standing form of [`SnapshotManager::clear`]
pub fn clear_directory(target: &Path, exclusions: &ExclusionSet) -> Result<BulkReport, AgentError> {
    let mut report = BulkReport::default();
    if !target.is_dir() {
        return Ok(report);
    }

    let entries = fs::read_dir(target).map_err(|e| {
        AgentError::ClearError(format!("Unable to list {}: {}", target.display(), e))
    })?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.record_failure(target, e);
                continue;
            }
        };

        let path = entry.path();
        let name = entry.file_name();
        if exclusions.matches_os(&name) {
            report.preserved.push(name.to_string_lossy().into_owned());
            continue;
        }

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            report.merge(remove_tree_forced(&path));
        } else {
            match remove_file_forced(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => report.record_failure(&path, e),
            }
        }
    }

    report.preserved.sort();
    Ok(report)
}
