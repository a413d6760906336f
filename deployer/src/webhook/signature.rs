//! Webhook signature verification
//!
//! The hosting platform signs each delivery with HMAC-SHA256 over the raw
//! request body and sends it as `X-Hub-Signature-256: sha256=<hex>`. The
//! digest must be computed over the bytes exactly as received, before any
//! JSON parsing.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm tag carried in front of the hex digest
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Minimum accepted secret length in bytes
pub const MIN_SECRET_LEN: usize = 16;

/// Shared webhook secret, redacted in `Debug` output
#[derive(Debug, Clone)]
pub struct SharedSecret(SecretString);

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(SecretString::from(secret.into()))
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

/// Compute the header value (`sha256=<hex>`) for a payload
pub fn compute_signature(secret: &SharedSecret, body: &[u8]) -> String {
    let digest = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            mac.finalize().into_bytes()
        }
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest))
}

/// Check a supplied signature header against the raw body
///
/// Never fails: a missing, mis-tagged or non-hex header is simply `false`.
/// The digest is always computed before the header is inspected so that a
/// malformed header does not return measurably earlier than a wrong one.
pub fn verify(secret: &SharedSecret, body: &[u8], supplied: Option<&str>) -> bool {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);

    match supplied.and_then(decode_header) {
        // verify_slice compares in constant time
        Some(expected) => mac.verify_slice(&expected).is_ok(),
        None => {
            let _ = mac.finalize();
            false
        }
    }
}

fn decode_header(header: &str) -> Option<Vec<u8>> {
    let hex_digest = header.trim().strip_prefix(SIGNATURE_PREFIX)?;
    hex::decode(hex_digest).ok()
}
