//! Stop / start / state control of deployment targets

pub mod app_pool;
pub mod command;
pub mod privileges;
pub mod supervisor;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::AgentError;

/// Runtime state of a target as reported by its backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Running,
    Unknown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Stopped => write!(f, "Stopped"),
            LifecycleState::Running => write!(f, "Running"),
            LifecycleState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Stop/start capability for one target's runtime backend
#[async_trait]
pub trait LifecycleController: Send + Sync {
    /// Short description of the backend, used in logs
    fn describe(&self) -> String;

    /// Stop the target
    async fn stop(&self) -> Result<(), AgentError>;

    /// Start the target
    async fn start(&self) -> Result<(), AgentError>;

    /// Current state; backends that cannot tell report `Unknown`
    async fn state(&self) -> LifecycleState;
}

/// How long to wait for a backend to converge after a control call
#[derive(Debug, Clone, Copy)]
pub struct SettleOptions {
    /// Delay between state polls
    pub poll_interval: Duration,

    /// Give up polling after this long
    pub timeout: Duration,

    /// Fixed wait used when the backend cannot report its state
    pub fallback_delay: Duration,
}

impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            timeout: Duration::from_secs(10),
            fallback_delay: Duration::from_secs(1),
        }
    }
}

impl SettleOptions {
    /// No waiting at all
    pub fn immediate() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            timeout: Duration::ZERO,
            fallback_delay: Duration::ZERO,
        }
    }
}

/// Poll `state()` until it reports `expected` or the timeout elapses.
///
/// A backend answering `Unknown` on the first poll is treated as unable to
/// report state, and a single fixed `fallback_delay` is observed instead.
/// Timing out is logged and not an error. Returns the last state seen.
pub async fn settle(
    controller: &dyn LifecycleController,
    expected: LifecycleState,
    options: &SettleOptions,
) -> LifecycleState {
    let deadline = Instant::now() + options.timeout;
    let mut state = controller.state().await;

    if state == LifecycleState::Unknown {
        debug!(
            backend = %controller.describe(),
            "State unavailable, waiting {:?}",
            options.fallback_delay
        );
        tokio::time::sleep(options.fallback_delay).await;
        return controller.state().await;
    }

    while state != expected {
        if Instant::now() >= deadline {
            warn!(
                backend = %controller.describe(),
                expected = %expected,
                actual = %state,
                "Target did not settle within {:?}",
                options.timeout
            );
            break;
        }
        tokio::time::sleep(options.poll_interval).await;
        state = controller.state().await;
    }

    state
}

/// Process-wide control configuration, fixed at start-up
#[derive(Debug, Clone)]
pub struct ControlOptions {
    /// Path to the app pool manager (`appcmd.exe`)
    pub app_pool_manager_path: PathBuf,

    /// Path to the process supervisor executable
    pub supervisor_path: PathBuf,

    /// Refuse supervisor commands unless running elevated
    pub require_elevation: bool,

    /// Persist the supervisor process list after a start
    pub save_after_start: bool,

    /// Upper bound for any single control command
    pub command_timeout: Duration,

    /// Convergence wait after state-changing calls
    pub settle: SettleOptions,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            app_pool_manager_path: PathBuf::from(app_pool::DEFAULT_APPCMD_PATH),
            supervisor_path: PathBuf::from("pm2"),
            require_elevation: true,
            save_after_start: false,
            command_timeout: Duration::from_secs(30),
            settle: SettleOptions::default(),
        }
    }
}
