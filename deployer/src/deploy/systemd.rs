//! systemd unit restart

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::deploy::detector::unit_is_active;
use crate::deploy::runner::CommandRunner;
use crate::errors::RestartError;

/// Lines of `systemctl status` / journal output attached to a failure
const DIAGNOSTIC_LINES: &str = "20";

/// Restart `unit` and wait for it to report active
///
/// The unit gets `retries` checks spaced `poll_interval` apart; the first
/// check happens one interval after the restart command returns.
pub async fn restart_unit(
    runner: &dyn CommandRunner,
    unit: &str,
    use_sudo: bool,
    retries: u32,
    poll_interval: Duration,
) -> Result<(), RestartError> {
    info!("Restarting unit {}...", unit);

    let argv = privileged(use_sudo, &["systemctl", "restart", unit]);
    let output = runner.run(&argv).await?;
    if !output.success() {
        warn!("Restart of unit {} failed: {}", unit, output.summary());
        return Err(RestartError::UnitRestartFailed {
            command: argv.join(" "),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
            diagnostics: collect_diagnostics(runner, unit).await,
        });
    }

    let attempts = retries.max(1);
    for attempt in 1..=attempts {
        tokio::time::sleep(poll_interval).await;
        if unit_is_active(runner, unit).await {
            info!("Unit {} is active (check {}/{})", unit, attempt, attempts);
            return Ok(());
        }
        debug!("Unit {} not active yet (check {}/{})", unit, attempt, attempts);
    }

    warn!("Unit {} did not become active", unit);
    Err(RestartError::UnitNotActive {
        unit: unit.to_string(),
        attempts,
        diagnostics: collect_diagnostics(runner, unit).await,
    })
}

async fn collect_diagnostics(runner: &dyn CommandRunner, unit: &str) -> String {
    let queries: [&[&str]; 2] = [
        &["systemctl", "status", unit, "--no-pager", "--lines", DIAGNOSTIC_LINES],
        &["journalctl", "-u", unit, "-n", DIAGNOSTIC_LINES, "--no-pager"],
    ];

    let mut sections = Vec::new();
    for argv in queries {
        match runner.run(argv).await {
            Ok(output) => {
                let text = output.summary();
                if !text.is_empty() {
                    sections.push(format!("$ {}\n{}", argv.join(" "), text));
                }
            }
            Err(e) => debug!("Diagnostic query failed: {}", e),
        }
    }
    sections.join("\n")
}

fn privileged<'a>(use_sudo: bool, argv: &[&'a str]) -> Vec<&'a str> {
    let mut full = Vec::with_capacity(argv.len() + 2);
    if use_sudo {
        full.extend(["sudo", "-n"]);
    }
    full.extend_from_slice(argv);
    full
}
