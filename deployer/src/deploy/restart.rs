//! Mode-specific restart dispatch

use std::time::Duration;

use tracing::warn;

use crate::deploy::detector::DeploymentMode;
use crate::deploy::runner::CommandRunner;
use crate::deploy::{compose, systemd};
use crate::errors::RestartError;

/// Restart options
#[derive(Debug, Clone)]
pub struct Options {
    pub unit: Option<String>,
    pub use_sudo: bool,
    pub compose_file: String,

    /// Number of active-state checks after `systemctl restart`
    pub retries: u32,

    /// Wait before each active-state check
    pub poll_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            unit: None,
            use_sudo: false,
            compose_file: "docker-compose.yml".to_string(),
            retries: 5,
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// What the restart step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,

    /// Unmanaged host; someone has to restart the application by hand
    ManualRestartRequired,
}

pub async fn restart(
    runner: &dyn CommandRunner,
    mode: DeploymentMode,
    options: &Options,
) -> Result<RestartOutcome, RestartError> {
    match mode {
        DeploymentMode::ProcessSupervised => {
            let unit = options.unit.as_deref().ok_or_else(|| RestartError::StepFailed {
                command: "systemctl restart".to_string(),
                code: -1,
                stderr: "no unit configured".to_string(),
            })?;
            systemd::restart_unit(
                runner,
                unit,
                options.use_sudo,
                options.retries,
                options.poll_interval,
            )
            .await?;
            Ok(RestartOutcome::Restarted)
        }
        DeploymentMode::ContainerOrchestrated => {
            compose::restart_stack(runner, &options.compose_file).await?;
            Ok(RestartOutcome::Restarted)
        }
        DeploymentMode::Unmanaged => {
            warn!("No supervisor detected; restart the application manually");
            Ok(RestartOutcome::ManualRestartRequired)
        }
    }
}
