//! Recursive directory copy and forced removal

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::filesys::exclusion::ExclusionSet;

/// A single item that could not be processed during a bulk operation
#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a best-effort bulk operation. Failures are collected, not raised.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    /// Number of files and directories removed
    pub removed: usize,

    /// Top-level names left in place because they are excluded
    pub preserved: Vec<String>,

    /// Items that could not be removed
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record_failure(&mut self, path: impl Into<PathBuf>, error: impl ToString) {
        self.failures.push(BulkFailure {
            path: path.into(),
            error: error.to_string(),
        });
    }

    pub fn merge(&mut self, other: BulkReport) {
        self.removed += other.removed;
        self.preserved.extend(other.preserved);
        self.failures.extend(other.failures);
    }

    /// Log every collected failure at warn level
    pub fn log_failures(&self, operation: &str) {
        for failure in &self.failures {
            warn!(
                path = %failure.path.display(),
                error = %failure.error,
                "{} could not remove item",
                operation
            );
        }
    }
}

/// Totals of a tree copy
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CopyStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Copy `source` into `dest` recursively, skipping any file or directory whose
/// name is in `exclusions` at every level. An excluded directory prunes its
/// whole subtree. Existing files in `dest` are overwritten.
pub fn copy_tree(
    source: &Path,
    dest: &Path,
    exclusions: &ExclusionSet,
) -> Result<CopyStats, AgentError> {
    if !source.is_dir() {
        return Err(AgentError::NotFound(format!(
            "Source directory does not exist: {}",
            source.display()
        )));
    }

    let mut stats = CopyStats::default();
    copy_tree_inner(source, dest, exclusions, &mut stats)?;
    Ok(stats)
}

fn copy_tree_inner(
    source: &Path,
    dest: &Path,
    exclusions: &ExclusionSet,
    stats: &mut CopyStats,
) -> Result<(), AgentError> {
    fs::create_dir_all(dest)?;
    stats.directories += 1;

    let mut subdirs = Vec::new();
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclusions.matches_os(&name) {
            debug!(path = %entry.path().display(), "Skipping excluded item");
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            subdirs.push((path, dest.join(&name)));
        } else if file_type.is_symlink() && path.is_dir() {
            debug!(path = %path.display(), "Skipping directory symlink");
        } else {
            stats.bytes += fs::copy(&path, dest.join(&name))?;
            stats.files += 1;
        }
    }

    for (src_dir, dest_dir) in subdirs {
        copy_tree_inner(&src_dir, &dest_dir, exclusions, stats)?;
    }

    Ok(())
}

/// Make a path writable so it can be deleted
pub(crate) fn make_writable(path: &Path, metadata: &fs::Metadata) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o200 == 0 {
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o200));
        }
    }

    #[cfg(not(unix))]
    {
        let mut perms = metadata.permissions();
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            let _ = fs::set_permissions(path, perms);
        }
    }
}

/// Remove a single file, clearing its read-only attribute first
pub(crate) fn remove_file_forced(path: &Path) -> std::io::Result<()> {
    if let Ok(metadata) = fs::symlink_metadata(path) {
        make_writable(path, &metadata);
    }
    fs::remove_file(path)
}

/// Delete a directory and everything below it, clearing read-only attributes.
///
/// Individual file and subdirectory failures are collected in the report and
/// the walk continues. When the directory itself cannot be removed at the end
/// (even after a plain `remove_dir_all` retry) it is recorded as one more
/// failure alongside everything collected so far. A missing directory, or a
/// symlink in its place, is a no-op.
pub fn remove_tree_forced(dir: &Path) -> BulkReport {
    let mut report = BulkReport::default();
    if !fs::symlink_metadata(dir).is_ok_and(|m| m.is_dir()) {
        return report;
    }

    let walk = (|| -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if entry.file_type()?.is_dir() {
                report.merge(remove_tree_forced(&path));
            } else {
                match remove_file_forced(&path) {
                    Ok(()) => report.removed += 1,
                    Err(e) => report.record_failure(&path, e),
                }
            }
        }

        if let Ok(metadata) = fs::metadata(dir) {
            make_writable(dir, &metadata);
        }
        fs::remove_dir(dir)
    })();

    match walk {
        Ok(()) => report.removed += 1,
        Err(walk_err) => match fs::remove_dir_all(dir) {
            Ok(()) => {
                report.removed += 1;
                report.failures.clear();
            }
            Err(_) => report.record_failure(
                dir,
                format!("Unable to delete directory: {}", walk_err),
            ),
        },
    }

    report
}
