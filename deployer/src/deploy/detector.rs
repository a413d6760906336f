//! Runtime supervision detection
//!
//! Recomputed on every deploy. The host can move between systemd and
//! compose between two pushes, so nothing here is cached.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::deploy::runner::CommandRunner;

/// How the application is currently supervised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// A systemd unit owns the process
    ProcessSupervised,

    /// A compose stack owns the containers
    ContainerOrchestrated,

    /// Nothing we know how to restart
    Unmanaged,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentMode::ProcessSupervised => "systemd",
            DeploymentMode::ContainerOrchestrated => "docker compose",
            DeploymentMode::Unmanaged => "unmanaged",
        };
        f.write_str(name)
    }
}

/// Detector options
#[derive(Debug, Clone)]
pub struct Options {
    /// systemd unit to look for; the supervisor check is skipped when unset
    pub unit: Option<String>,

    /// Compose descriptor file name, relative to the project root
    pub compose_file: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            unit: None,
            compose_file: "docker-compose.yml".to_string(),
        }
    }
}

/// Detect the supervision mode, in strict priority order
///
/// An active unit wins even when a compose file and engine are present: the
/// unit is what is serving traffic. Query failures count as "not active".
pub async fn detect(
    runner: &dyn CommandRunner,
    project_root: &Path,
    options: &Options,
) -> DeploymentMode {
    if let Some(unit) = options.unit.as_deref() {
        if unit_is_active(runner, unit).await {
            info!("Unit {} is active, using systemd restart", unit);
            return DeploymentMode::ProcessSupervised;
        }
        debug!("Unit {} is not active", unit);
    }

    let descriptor = project_root.join(&options.compose_file);
    if descriptor.is_file() {
        if container_engine_available(runner).await {
            info!("Found {} and a container engine", options.compose_file);
            return DeploymentMode::ContainerOrchestrated;
        }
        warn!(
            "Found {} but no container engine on PATH, treating as unmanaged",
            options.compose_file
        );
    }

    DeploymentMode::Unmanaged
}

/// `systemctl is-active` prints `active` and exits 0 only for a running unit
pub async fn unit_is_active(runner: &dyn CommandRunner, unit: &str) -> bool {
    match runner.run(&["systemctl", "is-active", unit]).await {
        Ok(output) => output.success() && output.stdout.trim() == "active",
        Err(e) => {
            debug!("systemctl query failed: {}", e);
            false
        }
    }
}

pub async fn container_engine_available(runner: &dyn CommandRunner) -> bool {
    match runner.run(&["docker", "--version"]).await {
        Ok(output) => output.success(),
        Err(e) => {
            debug!("docker not available: {}", e);
            false
        }
    }
}
