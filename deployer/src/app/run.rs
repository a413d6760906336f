//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::DeployerError;
use crate::server::serve::serve;
use crate::webhook::signature::SharedSecret;

/// Run the webhook receiver until the shutdown signal resolves
pub async fn run(
    version: String,
    secret: SharedSecret,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployerError> {
    info!("Initializing pushdeploy {}...", version);

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(secret, &options, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start receiver: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    info!(
        "Tracking {:?} on {}, project root {}",
        options.deploy.branches,
        options.event_kind,
        options.deploy.project_root.display()
    );

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    secret: SharedSecret,
    options: &AppOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), DeployerError> {
    let app_state = Arc::new(AppState::init(secret, options));
    shutdown_manager.with_app_state(app_state.clone())?;

    let mut shutdown_rx = shutdown_tx.subscribe();
    let server_signal: BoxFuture<'static, ()> = Box::pin(async move {
        let _ = shutdown_rx.recv().await;
    });

    info!("Initializing webhook server...");
    let server_handle = serve(
        &options.server,
        Arc::new(app_state.server_state()),
        server_signal,
    )
    .await?;
    shutdown_manager.with_server_handle(server_handle)?;

    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), DeployerError>>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), DeployerError> {
        if self.app_state.is_some() {
            return Err(DeployerError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), DeployerError>>,
    ) -> Result<(), DeployerError> {
        if self.server_handle.is_some() {
            return Err(DeployerError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), DeployerError> {
        let _ = self.shutdown_tx.send(());

        let max_delay = self.lifecycle_options.max_shutdown_delay;
        match tokio::time::timeout(max_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!("Shutdown timed out after {:?}", max_delay);
                Err(DeployerError::ShutdownError(format!(
                    "timed out after {:?}",
                    max_delay
                )))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), DeployerError> {
        info!("Shutting down pushdeploy...");

        // 1. Stop accepting deliveries
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| DeployerError::ShutdownError(e.to_string()))??;
        }

        // 2. Let an in-flight deploy finish
        if let Some(app_state) = self.app_state.take() {
            if app_state.deployer.is_busy() {
                warn!("Waiting for the running deploy to finish...");
            }
            if !app_state
                .deployer
                .wait_idle(self.lifecycle_options.max_shutdown_delay)
                .await
            {
                return Err(DeployerError::ShutdownError(
                    "deploy still running".to_string(),
                ));
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}
