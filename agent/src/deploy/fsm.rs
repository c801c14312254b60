//! Finite state machine for the update pipeline

use serde::{Deserialize, Serialize};

/// Update pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    /// Nothing done yet
    Idle,

    /// Stopping the target
    Stopping,

    /// Taking a snapshot of the content directory
    BackingUp,

    /// Removing the current content
    Clearing,

    /// Unpacking the new archive
    Extracting,

    /// Starting the target
    Starting,

    /// Pipeline completed
    Done,

    /// Pipeline aborted
    Failed,
}

impl UpdateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpdateState::Done | UpdateState::Failed)
    }
}

/// Update pipeline event
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// Begin stopping the target
    Stop,

    /// Target stopped, take a snapshot
    Backup,

    /// Remove current content
    Clear,

    /// Unpack the archive
    Extract,

    /// Start the target
    Start,

    /// Target started
    Finish,

    /// A step failed
    Fail(String),
}

/// Update FSM. Records every state it has been in.
#[derive(Debug, Clone)]
pub struct UpdateFsm {
    state: UpdateState,
    error: Option<String>,
    history: Vec<UpdateState>,
}

impl UpdateFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: UpdateState::Idle,
            error: None,
            history: vec![UpdateState::Idle],
        }
    }

    /// Get current state
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// States visited so far, in order
    pub fn history(&self) -> &[UpdateState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: UpdateEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            (UpdateState::Idle, UpdateEvent::Stop) => UpdateState::Stopping,

            // Backup is optional
            (UpdateState::Stopping, UpdateEvent::Backup) => UpdateState::BackingUp,
            (UpdateState::Stopping, UpdateEvent::Clear) => UpdateState::Clearing,
            (UpdateState::BackingUp, UpdateEvent::Clear) => UpdateState::Clearing,

            (UpdateState::Clearing, UpdateEvent::Extract) => UpdateState::Extracting,
            (UpdateState::Extracting, UpdateEvent::Start) => UpdateState::Starting,
            (UpdateState::Starting, UpdateEvent::Finish) => UpdateState::Done,

            // Any step may fail
            (state, UpdateEvent::Fail(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                UpdateState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!(
                    "Invalid transition: {:?} -> {:?}",
                    state, event
                ));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(())
    }
}

impl Default for UpdateFsm {
    fn default() -> Self {
        Self::new()
    }
}
