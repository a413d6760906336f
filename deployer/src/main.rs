//! pushdeploy - Entry Point
//!
//! Listens for signed push webhooks and redeploys the project on the host.

use std::collections::HashMap;
use std::env;

use anyhow::Context;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use pushdeploy::app::options::AppOptions;
use pushdeploy::app::run::run;
use pushdeploy::cli::{run_deploy, run_diagnostic, EXIT_CONFIG};
use pushdeploy::deploy::orchestrator::Orchestrator;
use pushdeploy::logs::init_logging;
use pushdeploy::settings::Settings;
use pushdeploy::utils::{await_shutdown_signal, version_info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let (settings, guard) = match load() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("pushdeploy: {:#}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        let code = run_diagnostic(&settings).await;
        exit(code, guard);
    }

    // Run a single deploy in the foreground
    if cli_args.contains_key("deploy") {
        let orchestrator = Orchestrator::for_host(settings.deploy_options());
        let code = run_deploy(&orchestrator, await_shutdown_signal()).await;
        exit(code, guard);
    }

    // Run the receiver starting here
    let secret = match settings.require_secret() {
        Ok(secret) => secret,
        Err(e) => {
            error!("{}", e);
            exit(EXIT_CONFIG, guard);
        }
    };

    let options = AppOptions::from_settings(&settings);
    info!("Running pushdeploy with options: {:?}", options);
    if let Err(e) = run(version.version, secret, options, await_shutdown_signal()).await {
        error!("Failed to run the receiver: {e}");
        exit(1, guard);
    }
}

fn load() -> anyhow::Result<(Settings, Option<WorkerGuard>)> {
    let settings = Settings::from_env().context("invalid configuration")?;
    let guard = init_logging(settings.log_options()).context("failed to initialize logging")?;
    Ok((settings, guard))
}

fn exit(code: i32, guard: Option<WorkerGuard>) -> ! {
    // Flush the file writer before the process goes away
    drop(guard);
    std::process::exit(code)
}
