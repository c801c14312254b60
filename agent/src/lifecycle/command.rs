//! External control command execution

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, error};

use crate::errors::AgentError;

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// The most useful text to show for a failure: stderr, else stdout
    pub fn failure_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Run `program args..` to completion, capturing output, within `timeout`.
///
/// A spawn failure or timeout is a lifecycle error; a non-zero exit is
/// reported through `CommandOutput::success`.
pub async fn run_command<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    timeout: Duration,
) -> Result<CommandOutput, AgentError> {
    let program = program.as_ref();
    debug!(
        "Running {} {}",
        program.to_string_lossy(),
        args.iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(AgentError::LifecycleError(format!(
                "Failed to run {}: {}",
                program.to_string_lossy(),
                e
            )))
        }
        Err(_) => {
            error!("{} timed out after {:?}", program.to_string_lossy(), timeout);
            return Err(AgentError::LifecycleError(format!(
                "{} timed out after {:?}",
                program.to_string_lossy(),
                timeout
            )));
        }
    };

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
