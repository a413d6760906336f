//! Finite state machine for one deploy run
//!
//! Update and restart are two sequential phases. The machine only allows a
//! restart from `Updated`, so a failed update can never reach the restart
//! step, and "updated but not restarted" is a terminal state of its own.

use serde::{Deserialize, Serialize};

use crate::models::deployment::DeploymentStatus;

/// Deploy phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Update,
    Restart,
}

/// Deploy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    /// Nothing has run yet
    NotStarted,

    /// Source tree is at the new revision, application not restarted
    Updated,

    /// Source tree updated and application restarted
    Restarted,

    /// The given phase failed
    Failed(Phase),
}

/// Deploy event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    UpdateSucceeded,
    UpdateFailed(String),
    RestartSucceeded,
    RestartFailed(String),
}

/// Deploy FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    state: DeployState,
    error: Option<String>,
}

impl DeployFsm {
    pub fn new() -> Self {
        Self {
            state: DeployState::NotStarted,
            error: None,
        }
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the restart phase may run
    pub fn can_restart(&self) -> bool {
        self.state == DeployState::Updated
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeployEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            (DeployState::NotStarted, DeployEvent::UpdateSucceeded) => DeployState::Updated,
            (DeployState::NotStarted, DeployEvent::UpdateFailed(err)) => {
                self.error = Some(err.clone());
                DeployState::Failed(Phase::Update)
            }

            (DeployState::Updated, DeployEvent::RestartSucceeded) => DeployState::Restarted,
            (DeployState::Updated, DeployEvent::RestartFailed(err)) => {
                self.error = Some(err.clone());
                DeployState::Failed(Phase::Restart)
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }

    /// Terminal status, `None` while nothing has happened
    pub fn status(&self) -> Option<DeploymentStatus> {
        match self.state {
            DeployState::NotStarted => None,
            DeployState::Updated => Some(DeploymentStatus::UpdatedNotRestarted),
            DeployState::Restarted => Some(DeploymentStatus::Succeeded),
            DeployState::Failed(Phase::Update) => Some(DeploymentStatus::CodeUpdateFailed),
            DeployState::Failed(Phase::Restart) => Some(DeploymentStatus::RestartFailed),
        }
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}
