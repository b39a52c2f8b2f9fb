use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hftmon_engine::executor::{CommandExecutor, CommandRunner, RawOutput, RunError};

use crate::DEFAULT_COMMAND_TIMEOUT;

type Scripted = Result<RawOutput, RunError>;

/// Command runner answering from a script instead of spawning processes.
///
/// Each command owns a queue of results. Results are consumed in order and
/// the last one repeats once the queue is down to it, so a single scripted
/// value behaves like a constant. Unscripted commands fail to spawn.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, command: &str, result: Scripted) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.entry(command.to_string()).or_default().push_back(result);
        }
        self
    }

    /// Successful run printing `stdout`
    pub fn stdout(self, command: &str, stdout: &str) -> Self {
        self.push(
            command,
            Ok(RawOutput {
                exit_code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        )
    }

    /// Successive successful runs, one output per run
    pub fn sequence<I, S>(mut self, command: &str, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for output in outputs {
            self = self.stdout(command, output.as_ref());
        }
        self
    }

    /// Run exiting with `code` and some noise on stderr
    pub fn exit(self, command: &str, code: i32) -> Self {
        self.push(
            command,
            Ok(RawOutput {
                exit_code: Some(code),
                stdout: String::new(),
                stderr: format!("{}: failed\n", command),
            }),
        )
    }

    /// Run that never finishes in time
    pub fn timeout(self, command: &str) -> Self {
        self.push(command, Err(RunError::Timeout(DEFAULT_COMMAND_TIMEOUT)))
    }

    /// Commands received so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// How many times `command` ran
    pub fn call_count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == command).count()
    }

    /// Executor over this runner with the default test timeout
    pub fn executor(self: &Arc<Self>) -> CommandExecutor {
        CommandExecutor::new(self.clone(), DEFAULT_COMMAND_TIMEOUT)
    }

    fn next(&self, command: &str) -> Scripted {
        let mut script = match self.script.lock() {
            Ok(script) => script,
            Err(_) => return Err(RunError::Spawn("script lock poisoned".to_string())),
        };

        match script.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(RunError::Spawn("empty script".to_string()))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(RunError::Spawn("empty script".to_string()))),
            None => Err(RunError::Spawn(format!("{}: command not found", command))),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<RawOutput, RunError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.to_string());
        }
        self.next(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_last_result_repeats() {
        let runner = ScriptedRunner::new().sequence("temp", ["1", "2"]);

        let outputs = [
            runner.run("temp", DEFAULT_COMMAND_TIMEOUT).await.unwrap().stdout,
            runner.run("temp", DEFAULT_COMMAND_TIMEOUT).await.unwrap().stdout,
            runner.run("temp", DEFAULT_COMMAND_TIMEOUT).await.unwrap().stdout,
        ];
        assert_eq!(outputs, ["1", "2", "2"]);
        assert_eq!(runner.call_count("temp"), 3);
    }

    #[tokio::test]
    async fn test_unscripted_command_fails_to_spawn() {
        let runner = ScriptedRunner::new();
        let result = runner.run("lscpu", DEFAULT_COMMAND_TIMEOUT).await;
        assert!(matches!(result, Err(RunError::Spawn(_))));
    }
}
