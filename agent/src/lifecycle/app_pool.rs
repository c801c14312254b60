//! Application pool control through the IIS `appcmd` tool

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::lifecycle::command::{run_command, CommandOutput};
use crate::lifecycle::{LifecycleController, LifecycleState};

/// Default location of the app pool manager
pub const DEFAULT_APPCMD_PATH: &str = r"C:\Windows\System32\inetsrv\appcmd.exe";

/// Controls a named application pool
#[derive(Debug, Clone)]
pub struct AppPoolController {
    appcmd: PathBuf,
    pool_name: String,
    timeout: Duration,
}

impl AppPoolController {
    pub fn new(appcmd: impl Into<PathBuf>, pool_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            appcmd: appcmd.into(),
            pool_name: pool_name.into(),
            timeout,
        }
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    fn pool_arg(&self) -> String {
        format!("/apppool.name:{}", self.pool_name)
    }

    async fn control(&self, verb: &str) -> Result<(), AgentError> {
        let args = [verb.to_string(), "apppool".to_string(), self.pool_arg()];
        let output = run_command(&self.appcmd, &args, self.timeout).await?;
        check_output(&self.pool_name, verb, &output)?;
        info!("App pool {} {} requested", self.pool_name, verb);
        Ok(())
    }
}

/// Map an appcmd result to success, NotFound or a lifecycle error
fn check_output(pool_name: &str, verb: &str, output: &CommandOutput) -> Result<(), AgentError> {
    if output.success {
        return Ok(());
    }

    let text = output.failure_text();
    if is_missing_pool(&text) {
        return Err(AgentError::NotFound(format!(
            "App pool {} does not exist",
            pool_name
        )));
    }

    // appcmd refuses to stop a stopped pool and start a started one
    if (verb == "stop" && text.contains("already stopped"))
        || (verb == "start" && text.contains("already started"))
    {
        return Ok(());
    }

    Err(AgentError::LifecycleError(format!(
        "Failed to {} app pool {}: {}",
        verb, pool_name, text
    )))
}

fn is_missing_pool(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("cannot find") || lower.contains("not found")
}

/// Parse `appcmd list apppool /text:state` output
pub fn parse_pool_state(text: &str) -> LifecycleState {
    match text.trim() {
        "Started" => LifecycleState::Running,
        "Stopped" => LifecycleState::Stopped,
        _ => LifecycleState::Unknown,
    }
}

#[async_trait]
impl LifecycleController for AppPoolController {
    fn describe(&self) -> String {
        format!("app pool {}", self.pool_name)
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.control("stop").await
    }

    async fn start(&self) -> Result<(), AgentError> {
        self.control("start").await
    }

    async fn state(&self) -> LifecycleState {
        let args = [
            "list".to_string(),
            "apppool".to_string(),
            self.pool_arg(),
            "/text:state".to_string(),
        ];
        match run_command(&self.appcmd, &args, self.timeout).await {
            Ok(output) if output.success => parse_pool_state(&output.stdout),
            Ok(output) => {
                warn!("Unable to query app pool {}: {}", self.pool_name, output.failure_text());
                LifecycleState::Unknown
            }
            Err(e) => {
                warn!("Unable to query app pool {}: {}", self.pool_name, e);
                LifecycleState::Unknown
            }
        }
    }
}
