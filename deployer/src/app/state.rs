//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::orchestrator::Orchestrator;
use crate::server::state::ServerState;
use crate::webhook::filter::EventFilter;
use crate::webhook::signature::SharedSecret;
use crate::workers::deployer::Deployer;

/// Main application state
pub struct AppState {
    /// Webhook secret, read-only after load
    pub secret: SharedSecret,

    /// Which deliveries trigger a deploy
    pub filter: EventFilter,

    /// Single-flight deploy dispatcher
    pub deployer: Arc<Deployer>,

    pub wait_for_result: bool,
}

impl AppState {
    /// Initialize application state
    pub fn init(secret: SharedSecret, options: &AppOptions) -> Self {
        info!("Initializing application state...");

        let orchestrator = Arc::new(Orchestrator::for_host(options.deploy.clone()));
        Self::with_orchestrator(secret, options, orchestrator)
    }

    /// State around a given orchestrator, used with scripted runners in tests
    pub fn with_orchestrator(
        secret: SharedSecret,
        options: &AppOptions,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        let filter = EventFilter::new(options.event_kind.clone(), options.deploy.branches.clone());
        Self {
            secret,
            filter,
            deployer: Arc::new(Deployer::new(orchestrator)),
            wait_for_result: options.wait_for_result,
        }
    }

    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            self.secret.clone(),
            self.filter.clone(),
            self.deployer.clone(),
            self.wait_for_result,
        )
    }
}
