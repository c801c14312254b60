//! Updater Agent Library
//!
//! Core modules for the remote deployment agent: archive extraction,
//! snapshots, target lifecycle control and the update pipeline.

pub mod app;
pub mod archive;
pub mod authn;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod lifecycle;
pub mod logs;
pub mod server;
pub mod storage;
pub mod targets;
pub mod telemetry;
pub mod utils;
