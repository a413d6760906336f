//! External command execution
//!
//! Every shell-out (git, systemctl, docker) goes through [`CommandRunner`] so
//! that the deploy components can be driven by [`ScriptedRunner`] in tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::errors::RunnerError;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when the process was terminated by a signal
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Exit code zero with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Non-zero exit with the given stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stdout, falling back to stderr when stdout is empty
    pub fn summary(&self) -> String {
        let out = self.stdout.trim();
        if out.is_empty() {
            self.stderr.trim().to_string()
        } else {
            out.to_string()
        }
    }
}

/// Narrow capability to run an external program
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv[0]` with the remaining arguments and wait for it to exit
    async fn run(&self, argv: &[&str]) -> Result<CommandOutput, RunnerError>;
}

/// Runs real processes with a fixed working directory
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    working_dir: PathBuf,
    command_timeout: Duration,
}

impl ProcessRunner {
    pub fn new(working_dir: impl Into<PathBuf>, command_timeout: Duration) -> Self {
        Self {
            working_dir: working_dir.into(),
            command_timeout,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[&str]) -> Result<CommandOutput, RunnerError> {
        let (program, args) = argv.split_first().ok_or(RunnerError::EmptyCommand)?;

        debug!("Running: {}", argv.join(" "));

        // kill_on_drop terminates the child when the future is cancelled,
        // either by the timeout below or by an outer deadline/interrupt.
        let child = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let output = tokio::time::timeout(self.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| RunnerError::Timeout {
                program: program.to_string(),
                timeout: self.command_timeout,
            })?
            .map_err(|source| RunnerError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let result = CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!("`{}` exited with {}", program, result.code);
        Ok(result)
    }
}

type Responder = Box<dyn Fn(&[&str]) -> Option<Result<CommandOutput, RunnerError>> + Send + Sync>;

/// In-memory runner that answers from a script and records every call
///
/// Responses are matched in order: queued one-shot responses for an exact
/// command line first, then the fallback responder, then a default of
/// "exit 0, empty output".
pub struct ScriptedRunner {
    queued: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(Vec::new()),
            responder: None,
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Fallback for commands without a queued response
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&[&str]) -> Option<Result<CommandOutput, RunnerError>> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Sleep this long before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a response for the next call with exactly this command line
    pub fn push(&self, command_line: &str, output: CommandOutput) -> &Self {
        let mut queued = self.queued.lock().unwrap_or_else(|e| e.into_inner());
        match queued.iter_mut().find(|(line, _)| line == command_line) {
            Some((_, outputs)) => outputs.push_back(output),
            None => queued.push((command_line.to_string(), VecDeque::from([output]))),
        }
        self
    }

    /// Every command line run so far, space-joined
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of recorded command lines starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, argv: &[&str]) -> Result<CommandOutput, RunnerError> {
        if argv.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        let line = argv.join(" ");
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let queued = {
            let mut queued = self.queued.lock().unwrap_or_else(|e| e.into_inner());
            queued
                .iter_mut()
                .find(|(l, outputs)| *l == line && !outputs.is_empty())
                .and_then(|(_, outputs)| outputs.pop_front())
        };
        if let Some(output) = queued {
            return Ok(output);
        }

        if let Some(responder) = &self.responder {
            if let Some(result) = responder(argv) {
                return result;
            }
        }

        Ok(CommandOutput::default())
    }
}
