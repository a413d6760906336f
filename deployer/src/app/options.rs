//! Application configuration options

use std::time::Duration;

use crate::deploy::orchestrator;
use crate::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Server configuration
    pub server: ServerOptions,

    /// Deploy run configuration
    pub deploy: orchestrator::Options,

    /// Event kind that triggers a deploy
    pub event_kind: String,

    /// Answer deliveries only once the deploy finished
    pub wait_for_result: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions::default(),
            deploy: orchestrator::Options::default(),
            event_kind: "push".to_string(),
            wait_for_result: false,
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let deploy = settings.deploy_options();
        Self {
            lifecycle: LifecycleOptions {
                // Leave an in-flight deploy room to finish on shutdown
                max_shutdown_delay: deploy.timeout + Duration::from_secs(5),
            },
            server: ServerOptions {
                host: settings.host.clone(),
                port: settings.port,
            },
            deploy,
            event_kind: settings.event_kind.clone(),
            wait_for_result: settings.wait_for_result,
        }
    }
}

/// Lifecycle options for the receiver
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}
