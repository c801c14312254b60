//! Update pipeline

pub mod content;
pub mod fsm;
pub mod locks;
pub mod orchestrator;

pub use content::{ArchiveSource, ContentStore, LocalContentStore};
pub use orchestrator::{ControlAction, ControlOutcome, UpdateOrchestrator, UpdateOutcome};

