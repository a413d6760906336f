//! Command line entry points shared by both binaries

use std::future::Future;

use colored::Colorize;
use tracing::warn;

use crate::deploy::detector;
use crate::deploy::git;
use crate::deploy::orchestrator::Orchestrator;
use crate::deploy::runner::ProcessRunner;
use crate::errors::LockError;
use crate::models::deployment::{DeploymentResult, DeploymentStatus};
use crate::settings::Settings;
use crate::utils::version_info;

/// Configuration could not be loaded
pub const EXIT_CONFIG: i32 = 3;

/// Another deploy holds the project root's run lock
pub const EXIT_BUSY: i32 = 4;

/// The run was cut short by SIGINT or SIGTERM
pub const EXIT_INTERRUPTED: i32 = 130;

/// Run one deploy in the foreground and return the process exit code
///
/// When `interrupt` resolves first the deploy future is dropped, which kills
/// whichever child process was running at the time.
pub async fn run_deploy(
    orchestrator: &Orchestrator,
    interrupt: impl Future<Output = ()>,
) -> i32 {
    tokio::select! {
        result = orchestrator.run() => match result {
            Ok(result) => {
                print_result(&result);
                result.exit_code()
            }
            Err(LockError::Held { path }) => {
                warn!("Deploy already running, lock {} is held", path.display());
                error("Another deploy is running in this project; try again when it finishes");
                EXIT_BUSY
            }
            Err(e) => {
                error(&e.to_string());
                EXIT_CONFIG
            }
        },
        _ = interrupt => {
            warn!("Deploy interrupted");
            error("Deploy interrupted before completion; check the working tree and service state");
            EXIT_INTERRUPTED
        }
    }
}

/// Print the detected mode and the effective configuration, without side effects
pub async fn run_diagnostic(settings: &Settings) -> i32 {
    let version = version_info();
    let options = settings.deploy_options();
    let runner = ProcessRunner::new(options.project_root.clone(), options.timeout);

    println!("{}", "pushdeploy diagnostic".bold());
    key_value("version", &format!("{} ({})", version.version, version.git_hash));
    key_value("project root", &options.project_root.display().to_string());
    key_value("listen", &format!("{}:{}", settings.host, settings.port));
    key_value("event", &settings.event_kind);
    key_value("branches", &options.branches.join(", "));
    key_value("remote", &options.git.remote);
    key_value(
        "systemd unit",
        options.detector.unit.as_deref().unwrap_or("(not configured)"),
    );
    key_value("compose file", &options.detector.compose_file);
    key_value("deploy timeout", &format!("{}s", options.timeout.as_secs()));

    let secret_ok = match settings.require_secret() {
        Ok(secret) => {
            success(&format!("webhook secret set ({} bytes)", secret.len()));
            true
        }
        Err(e) => {
            error(&e.to_string());
            false
        }
    };

    let mode = detector::detect(&runner, &options.project_root, &options.detector).await;
    info(&format!("deployment mode: {}", mode));

    match git::current_revision(&runner).await {
        Ok(revision) => info(&format!("current revision: {}", revision)),
        Err(e) => warning(&format!("current revision unknown: {}", e)),
    }

    if secret_ok {
        0
    } else {
        EXIT_CONFIG
    }
}

/// Human-readable summary of a finished deploy
pub fn print_result(result: &DeploymentResult) {
    println!();
    key_value("run", &result.run_id);
    key_value("mode", &result.mode.to_string());
    if let Some(branch) = &result.branch {
        key_value("branch", branch);
    }
    if let Some(revision) = &result.revision {
        let previous = result
            .previous_revision
            .as_ref()
            .map(|r| r.short().to_string())
            .unwrap_or_else(|| "?".to_string());
        key_value("revision", &format!("{} -> {}", previous, revision.short()));
    }

    let status = result.status.to_string();
    match result.status {
        DeploymentStatus::Succeeded => success(&format!("Deploy {}", status)),
        DeploymentStatus::UpdatedNotRestarted => {
            warning(&format!("Deploy {}: restart the application manually", status))
        }
        DeploymentStatus::CodeUpdateFailed => {
            error(&format!("Deploy {}: previous revision still serving", status))
        }
        DeploymentStatus::RestartFailed => {
            error(&format!("Deploy {}: source is ahead of the running application", status))
        }
    }
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

pub fn key_value(key: &str, value: &str) {
    println!("{}: {}", key.bold(), value);
}
