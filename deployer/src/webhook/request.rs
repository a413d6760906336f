//! Inbound delivery model

use axum::body::Bytes;
use http::HeaderMap;
use serde::Deserialize;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// One webhook delivery as received, before any parsing of the body
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub body: Bytes,
    pub signature: Option<String>,
    pub event_kind: Option<String>,
    pub delivery_id: String,
}

impl WebhookRequest {
    pub fn from_parts(headers: &HeaderMap, body: Bytes) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            body,
            signature: header(SIGNATURE_HEADER),
            event_kind: header(EVENT_HEADER),
            delivery_id: header(DELIVERY_HEADER)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Parse the body; only call after the signature has been verified
    pub fn payload(&self) -> Result<PushPayload, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The parts of a push payload the receiver looks at
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,

    /// Commit the branch now points to
    #[serde(default)]
    pub after: Option<String>,

    #[serde(default)]
    pub pusher: Option<Pusher>,

    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadCommit {
    pub id: Option<String>,
    pub message: Option<String>,
}

impl PushPayload {
    pub fn pusher_name(&self) -> &str {
        self.pusher
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .unwrap_or("unknown")
    }
}
