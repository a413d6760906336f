//! Error types for the deployer

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Process-level error type
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

/// Failure to run an external command at all
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("empty command line")]
    EmptyCommand,
}

/// The per-tree run lock could not be taken
#[derive(Error, Debug)]
pub enum LockError {
    #[error("another deploy is running in this tree (lock {})", .path.display())]
    Held { path: PathBuf },

    #[error("cannot open lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Every candidate branch failed to pull; the working tree is untouched
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("no branch candidates configured")]
    NoBranches,

    #[error("pull failed for every candidate branch ({})", .attempts.join("; "))]
    AllBranchesFailed { attempts: Vec<String> },

    #[error("unable to read current revision: {0}")]
    Revision(String),

    #[error("working tree could not be restored to {revision}: {detail}")]
    DirtyAfterFailure { revision: String, detail: String },

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("source update timed out after {0:?}")]
    TimedOut(Duration),
}

/// Code was updated but the application could not be restarted
#[derive(Error, Debug)]
pub enum RestartError {
    #[error("`{command}` exited with status {code}: {stderr}")]
    StepFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` exited with status {code}: {stderr}")]
    UnitRestartFailed {
        command: String,
        code: i32,
        stderr: String,
        diagnostics: String,
    },

    #[error("unit {unit} is not active after {attempts} checks")]
    UnitNotActive {
        unit: String,
        attempts: u32,
        diagnostics: String,
    },

    #[error("no container engine front end available")]
    NoComposeFrontEnd,

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("restart timed out after {0:?}")]
    TimedOut(Duration),
}

impl RestartError {
    /// Status and log excerpt captured for a failed supervisor restart
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            RestartError::UnitRestartFailed { diagnostics, .. }
            | RestartError::UnitNotActive { diagnostics, .. }
                if !diagnostics.is_empty() =>
            {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}
