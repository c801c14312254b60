//! Processes managed by an external process supervisor (pm2-compatible CLI)

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::lifecycle::command::{run_command, CommandOutput};
use crate::lifecycle::privileges::is_elevated;
use crate::lifecycle::{LifecycleController, LifecycleState};

/// Controls one process under the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorController {
    supervisor: PathBuf,
    process_id: String,
    timeout: Duration,
    require_elevation: bool,
    save_after_start: bool,
}

impl SupervisorController {
    pub fn new(supervisor: impl Into<PathBuf>, process_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            supervisor: supervisor.into(),
            process_id: process_id.into(),
            timeout,
            require_elevation: true,
            save_after_start: false,
        }
    }

    pub fn with_require_elevation(mut self, require: bool) -> Self {
        self.require_elevation = require;
        self
    }

    pub fn with_save_after_start(mut self, save: bool) -> Self {
        self.save_after_start = save;
        self
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Run a supervisor sub-command. The supervisor is usually a script
    /// shim on Windows, so it goes through `cmd /c` there.
    async fn exec(&self, args: &[&str]) -> Result<CommandOutput, AgentError> {
        if self.require_elevation && !is_elevated() {
            return Err(AgentError::LifecycleError(
                "The agent must run with elevated privileges to control supervisor processes"
                    .to_string(),
            ));
        }

        let mut argv: Vec<OsString> = Vec::with_capacity(args.len() + 2);
        let program: OsString = if cfg!(windows) {
            argv.push("/c".into());
            argv.push(self.supervisor.clone().into_os_string());
            "cmd.exe".into()
        } else {
            self.supervisor.clone().into_os_string()
        };
        argv.extend(args.iter().map(OsString::from));

        run_command(program, &argv, self.timeout).await
    }

    async fn control(&self, verb: &str) -> Result<(), AgentError> {
        let output = self.exec(&[verb, self.process_id.as_str()]).await?;
        if !output.success {
            return Err(AgentError::LifecycleError(format!(
                "Failed to {} process {}: {}",
                verb,
                self.process_id,
                output.failure_text()
            )));
        }
        info!("Supervisor process {} {} requested", self.process_id, verb);
        Ok(())
    }

    /// Persist the supervisor's process list
    pub async fn save(&self) -> Result<(), AgentError> {
        let output = self.exec(&["save"]).await?;
        if !output.success {
            return Err(AgentError::LifecycleError(format!(
                "Failed to save supervisor process list: {}",
                output.failure_text()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ProcessEntry {
    #[serde(default)]
    pm_id: Option<serde_json::Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    pm2_env: Option<ProcessEnv>,
}

#[derive(Debug, Deserialize)]
struct ProcessEnv {
    #[serde(default)]
    status: Option<String>,
}

/// Find `process_id` (numeric id or name) in `jlist` JSON and map its status
pub fn parse_process_state(jlist: &str, process_id: &str) -> LifecycleState {
    let Ok(entries) = serde_json::from_str::<Vec<ProcessEntry>>(jlist) else {
        return LifecycleState::Unknown;
    };

    let entry = entries.iter().find(|entry| {
        let id_matches = match &entry.pm_id {
            Some(serde_json::Value::Number(n)) => n.to_string() == process_id,
            Some(serde_json::Value::String(s)) => s == process_id,
            _ => false,
        };
        id_matches || entry.name.as_deref() == Some(process_id)
    });

    match entry
        .and_then(|e| e.pm2_env.as_ref())
        .and_then(|env| env.status.as_deref())
    {
        Some("online") => LifecycleState::Running,
        Some("stopped") => LifecycleState::Stopped,
        _ => LifecycleState::Unknown,
    }
}

#[async_trait]
impl LifecycleController for SupervisorController {
    fn describe(&self) -> String {
        format!("supervisor process {}", self.process_id)
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.control("stop").await
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.control("start").await?;
        if self.save_after_start {
            if let Err(e) = self.save().await {
                warn!("{}", e);
            }
        }
        Ok(())
    }

    async fn state(&self) -> LifecycleState {
        match self.exec(&["jlist"]).await {
            Ok(output) if output.success => parse_process_state(&output.stdout, &self.process_id),
            Ok(output) => {
                warn!("Unable to list supervisor processes: {}", output.failure_text());
                LifecycleState::Unknown
            }
            Err(e) => {
                warn!("Unable to list supervisor processes: {}", e);
                LifecycleState::Unknown
            }
        }
    }
}
