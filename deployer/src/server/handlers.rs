//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::server::state::ServerState;
use crate::utils::version_info;
use crate::webhook::filter::FilterDecision;
use crate::webhook::request::WebhookRequest;
use crate::webhook::signature;
use crate::workers::deployer::{DeployTrigger, Dispatch};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "pushdeploy".to_string(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// A delivery the receiver refuses to act on
#[derive(Debug)]
pub enum WebhookRejection {
    /// Signature missing or wrong
    Unauthorized,

    /// Body is not the JSON we expect
    MalformedPayload(String),

    /// A deploy already holds the lock
    Busy,

    /// The deploy could not start, or its task died without a result
    DeployAborted(String),
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            WebhookRejection::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "status": "unauthorized", "reason": "invalid signature" }),
            ),
            WebhookRejection::MalformedPayload(reason) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "bad_request", "reason": reason }),
            ),
            WebhookRejection::Busy => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "status": "busy", "reason": "a deploy is already in progress" }),
            ),
            WebhookRejection::DeployAborted(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "status": "error", "reason": reason }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Webhook handler
///
/// Order matters: signature over the raw bytes, then JSON parsing, then the
/// event filter, then the single-flight dispatch.
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookRejection> {
    let request = WebhookRequest::from_parts(&headers, body);
    let delivery = request.delivery_id.as_str();

    if !signature::verify(&state.secret, &request.body, request.signature.as_deref()) {
        warn!("Rejected delivery {}: signature missing or invalid", delivery);
        return Err(WebhookRejection::Unauthorized);
    }

    let payload = request.payload().map_err(|e| {
        warn!("Rejected delivery {}: malformed payload: {}", delivery, e);
        WebhookRejection::MalformedPayload(e.to_string())
    })?;

    let branch = match state
        .filter
        .decide(request.event_kind.as_deref(), payload.git_ref.as_deref())
    {
        FilterDecision::Deploy { branch } => branch,
        FilterDecision::Ping => {
            info!("Ping received (delivery {})", delivery);
            return Ok(Json(json!({ "status": "pong" })).into_response());
        }
        FilterDecision::Ignored { reason } => {
            info!("Ignoring delivery {}: {}", delivery, reason);
            return Ok(Json(json!({ "status": "ignored", "reason": reason })).into_response());
        }
    };

    let trigger = DeployTrigger {
        delivery_id: request.delivery_id.clone(),
        branch,
        pusher: payload.pusher_name().to_string(),
    };

    let handle = match state.deployer.try_dispatch(trigger) {
        Dispatch::Started(handle) => handle,
        Dispatch::Busy => return Err(WebhookRejection::Busy),
        Dispatch::Failed(e) => return Err(WebhookRejection::DeployAborted(e.to_string())),
    };

    if !state.wait_for_result {
        return Ok(Json(json!({ "status": "accepted", "delivery": delivery })).into_response());
    }

    match handle.await {
        Ok(result) => Ok(Json(result).into_response()),
        Err(e) => {
            error!("Deploy task for delivery {} aborted: {}", delivery, e);
            Err(WebhookRejection::DeployAborted(e.to_string()))
        }
    }
}
