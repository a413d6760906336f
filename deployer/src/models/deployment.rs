//! Deployment models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::deploy::detector::DeploymentMode;
use crate::deploy::git::RevisionId;

/// Terminal status of one deploy run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Source updated and application restarted
    Succeeded,

    /// Source updated, no supervisor to restart through
    UpdatedNotRestarted,

    /// Every pull failed; the old revision keeps serving
    CodeUpdateFailed,

    /// Source updated but the restart failed; needs an operator
    RestartFailed,
}

impl DeploymentStatus {
    /// Exit code for the manual deploy command
    pub fn exit_code(&self) -> i32 {
        match self {
            DeploymentStatus::Succeeded | DeploymentStatus::UpdatedNotRestarted => 0,
            DeploymentStatus::CodeUpdateFailed => 1,
            DeploymentStatus::RestartFailed => 2,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.exit_code() != 0
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeploymentStatus::Succeeded => "succeeded",
            DeploymentStatus::UpdatedNotRestarted => "updated, not restarted",
            DeploymentStatus::CodeUpdateFailed => "code update failed",
            DeploymentStatus::RestartFailed => "restart failed",
        };
        f.write_str(label)
    }
}

/// Severity of a deploy log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warn,
    Error,
}

/// One line of the diagnostic log kept with a result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLog {
    pub at: DateTime<Utc>,
    pub level: LogSeverity,
    pub message: String,
}

/// Collects the diagnostic log of a run and mirrors each line to tracing
#[derive(Debug, Default)]
pub struct DeployLog {
    entries: Vec<DeploymentLog>,
}

impl DeployLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(LogSeverity::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.push(LogSeverity::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.push(LogSeverity::Error, message);
    }

    fn push(&mut self, level: LogSeverity, message: String) {
        self.entries.push(DeploymentLog {
            at: Utc::now(),
            level,
            message,
        });
    }

    pub fn into_entries(self) -> Vec<DeploymentLog> {
        self.entries
    }
}

/// Outcome of one orchestrator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub run_id: String,
    pub status: DeploymentStatus,
    pub mode: DeploymentMode,

    /// Branch that was pulled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_revision: Option<RevisionId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<RevisionId>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub log: Vec<DeploymentLog>,
}

impl DeploymentResult {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}
