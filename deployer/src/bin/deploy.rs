//! Manual deploy command
//!
//! Runs the orchestrator once in the current project and exits with the
//! status code of the run. No arguments required.

use anyhow::Context;

use pushdeploy::cli::{run_deploy, EXIT_CONFIG};
use pushdeploy::deploy::orchestrator::Orchestrator;
use pushdeploy::logs::init_logging;
use pushdeploy::settings::Settings;
use pushdeploy::utils::await_shutdown_signal;

#[tokio::main]
async fn main() {
    let (orchestrator, guard) = match load() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("pushdeploy-deploy: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    let code = run_deploy(&orchestrator, await_shutdown_signal()).await;
    drop(guard);
    std::process::exit(code);
}

fn load() -> anyhow::Result<(Orchestrator, Option<tracing_appender::non_blocking::WorkerGuard>)> {
    let settings = Settings::from_env().context("invalid configuration")?;
    let guard = init_logging(settings.log_options()).context("failed to initialize logging")?;
    Ok((Orchestrator::for_host(settings.deploy_options()), guard))
}
