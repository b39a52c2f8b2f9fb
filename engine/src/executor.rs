//! Command execution
//!
//! Runs diagnostic shell commands with a hard timeout and classifies the
//! result. Failures never surface as errors: they are folded into the
//! returned [`CommandOutcome`] together with a human readable fallback.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Fallback text for commands whose first token has no dedicated message
pub const GENERIC_FALLBACK: &str = "Command failed or no output";

/// Fallback text for `sensors`
pub const SENSORS_FALLBACK: &str = "No sensors data available (install lm-sensors or check host if VM)";

/// Raw result of a finished process
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }
}

/// Reasons a runner could not produce a [`RawOutput`]
#[derive(Error, Debug, Clone)]
pub enum RunError {
    #[error("failed to spawn: {0}")]
    Spawn(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Process spawning seam
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` through a shell, giving up after `timeout`
    async fn run(&self, command: &str, timeout: Duration) -> Result<RawOutput, RunError>;
}

/// Runs commands with `sh -c`
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<RawOutput, RunError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::Spawn(e.to_string()))?;

        // Dropping the child on timeout kills it
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| RunError::Timeout(timeout))?
            .map_err(|e| RunError::Spawn(e.to_string()))?;

        Ok(RawOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Classification of an executed command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Success,
    Failed,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Success => write!(f, "Success"),
            CommandStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Why a command was classified as failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    NonZeroExit { code: Option<i32> },
    Spawn { message: String },
    Timeout { secs: u64 },
    EmptyOutput,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NonZeroExit { code: Some(code) } => write!(f, "exit status {}", code),
            FailureReason::NonZeroExit { code: None } => write!(f, "terminated by signal"),
            FailureReason::Spawn { message } => write!(f, "could not start: {}", message),
            FailureReason::Timeout { secs } => write!(f, "timed out after {}s", secs),
            FailureReason::EmptyOutput => write!(f, "no output"),
        }
    }
}

impl From<RunError> for FailureReason {
    fn from(error: RunError) -> Self {
        match error {
            RunError::Spawn(message) => FailureReason::Spawn { message },
            RunError::Timeout(timeout) => FailureReason::Timeout {
                secs: timeout.as_secs(),
            },
        }
    }
}

/// Result of [`CommandExecutor::execute`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub status: CommandStatus,

    /// Raw output on success, fallback message on failure
    pub output: String,

    pub reason: Option<FailureReason>,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }

    /// Reason text, empty on success
    pub fn reason_text(&self) -> String {
        self.reason.as_ref().map(|r| r.to_string()).unwrap_or_default()
    }

    fn failed(command: &str, reason: FailureReason) -> Self {
        Self {
            status: CommandStatus::Failed,
            output: fallback_message(command).to_string(),
            reason: Some(reason),
        }
    }
}

/// Fallback message keyed by the first token of the command
pub fn fallback_message(command: &str) -> &'static str {
    match command.split_whitespace().next() {
        Some("sensors") => SENSORS_FALLBACK,
        _ => GENERIC_FALLBACK,
    }
}

/// Executes commands through a [`CommandRunner`] with a fixed timeout
#[derive(Clone)]
pub struct CommandExecutor {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Executor backed by [`ShellRunner`]
    pub fn shell(timeout: Duration) -> Self {
        Self::new(Arc::new(ShellRunner), timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a command and classify the result
    pub async fn execute(&self, command: &str, require_output: bool) -> CommandOutcome {
        let raw = match self.runner.run(command, self.timeout).await {
            Ok(raw) => raw,
            Err(error) => {
                debug!(command, error = %error, "Command did not complete");
                return CommandOutcome::failed(command, error.into());
            }
        };

        if !raw.success() {
            debug!(command, exit_code = ?raw.exit_code, "Command exited unsuccessfully");
            return CommandOutcome::failed(command, FailureReason::NonZeroExit { code: raw.exit_code });
        }

        let output = raw.combined();
        if require_output && output.trim().is_empty() {
            debug!(command, "Command produced no output");
            return CommandOutcome::failed(command, FailureReason::EmptyOutput);
        }

        debug!(command, bytes = output.len(), "Command succeeded");
        CommandOutcome {
            status: CommandStatus::Success,
            output,
            reason: None,
        }
    }
}
