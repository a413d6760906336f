//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DeployerError;
use crate::server::handlers::{health_handler, version_handler, webhook_handler};
use crate::server::state::ServerState;

/// Largest accepted webhook body
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Build the router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deliveries
        .route("/webhook", post(webhook_handler))
        // State and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployerError>>, DeployerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting webhook receiver on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
