//! Filesystem side of the update pipeline

use std::path::{Path, PathBuf};

use crate::archive::{ExtractReport, Extractor};
use crate::errors::AgentError;
use crate::filesys::exclusion::ExclusionSet;
use crate::filesys::snapshot::{clear_directory, Snapshot, SnapshotManager};
use crate::filesys::tree::BulkReport;

/// Where the uploaded archive lives
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    /// Archive spooled to disk
    Path(PathBuf),

    /// Archive held in memory
    Memory(Vec<u8>),
}

/// Backup, clear and extract operations used by the orchestrator.
/// All calls are blocking and run on the blocking pool.
pub trait ContentStore: Send + Sync {
    fn backup(
        &self,
        source: &Path,
        backup_base: &Path,
        name: &str,
        exclusions: &ExclusionSet,
    ) -> Result<Snapshot, AgentError>;

    fn clear(&self, target: &Path, exclusions: &ExclusionSet) -> Result<BulkReport, AgentError>;

    fn extract(&self, archive: &ArchiveSource, dest: &Path) -> Result<ExtractReport, AgentError>;
}

/// Content store backed by the local filesystem
#[derive(Debug, Clone, Default)]
pub struct LocalContentStore {
    snapshots: SnapshotManager,
    extractor: Extractor,
}

impl LocalContentStore {
    pub fn new(snapshots: SnapshotManager, extractor: Extractor) -> Self {
        Self {
            snapshots,
            extractor,
        }
    }
}

impl ContentStore for LocalContentStore {
    fn backup(
        &self,
        source: &Path,
        backup_base: &Path,
        name: &str,
        exclusions: &ExclusionSet,
    ) -> Result<Snapshot, AgentError> {
        self.snapshots.backup(source, backup_base, name, exclusions)
    }

    fn clear(&self, target: &Path, exclusions: &ExclusionSet) -> Result<BulkReport, AgentError> {
        clear_directory(target, exclusions)
    }

    fn extract(&self, archive: &ArchiveSource, dest: &Path) -> Result<ExtractReport, AgentError> {
        match archive {
            ArchiveSource::Path(path) => self.extractor.extract_file(path, dest),
            ArchiveSource::Memory(bytes) => self.extractor.extract(std::io::Cursor::new(bytes.as_slice()), dest),
        }
    }
}
