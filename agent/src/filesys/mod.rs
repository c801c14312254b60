//! Filesystem operations: snapshots, clearing and file helpers

pub mod exclusion;
pub mod file;
pub mod snapshot;
pub mod tree;
