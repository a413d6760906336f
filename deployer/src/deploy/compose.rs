//! Docker Compose restart

use tracing::{debug, info};

use crate::deploy::runner::CommandRunner;
use crate::errors::RestartError;

/// Pick the compose front end: the `docker compose` plugin, else the
/// standalone `docker-compose` binary
pub async fn resolve_front_end(
    runner: &dyn CommandRunner,
) -> Result<Vec<&'static str>, RestartError> {
    if let Ok(output) = runner.run(&["docker", "compose", "version"]).await {
        if output.success() {
            return Ok(vec!["docker", "compose"]);
        }
    }

    debug!("'docker compose' unavailable, trying docker-compose...");
    if let Ok(output) = runner.run(&["docker-compose", "--version"]).await {
        if output.success() {
            return Ok(vec!["docker-compose"]);
        }
    }

    Err(RestartError::NoComposeFrontEnd)
}

/// Stop the stack, rebuild without cache, start it detached
///
/// Stops at the first failing step and leaves the stack as that step left it.
pub async fn restart_stack(
    runner: &dyn CommandRunner,
    compose_file: &str,
) -> Result<(), RestartError> {
    let front_end = resolve_front_end(runner).await?;
    info!("Rebuilding compose stack with {}...", front_end.join(" "));

    let steps: [&[&str]; 3] = [&["down"], &["build", "--no-cache"], &["up", "-d"]];
    for step in steps {
        let mut argv: Vec<&str> = front_end.clone();
        argv.extend(["-f", compose_file]);
        argv.extend_from_slice(step);

        debug!("Running {}", argv.join(" "));
        let output = runner.run(&argv).await?;
        if !output.success() {
            return Err(RestartError::StepFailed {
                command: argv.join(" "),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
    }

    info!("Compose stack is up");
    Ok(())
}
