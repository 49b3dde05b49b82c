//! Stripe webhook signature verification.
//!
//! Stripe signs webhook requests using HMAC-SHA256 over `"{timestamp}.{body}"`.
//! Reference: https://docs.stripe.com/webhooks#verify-manually

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use super::event::{Event, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

/// Name of the header Stripe puts the signature in.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Reasons a webhook payload is rejected before dispatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("stripe-signature header is missing")]
    MissingHeader,

    #[error("no timestamp in signature header")]
    MissingTimestamp,

    #[error("invalid timestamp in signature header: {0:?}")]
    InvalidTimestamp(String),

    #[error("no v1 signatures in signature header")]
    NoSignatures,

    #[error("timestamp is {age_secs}s away from now, tolerance is {tolerance_secs}s")]
    TimestampOutsideTolerance { age_secs: u64, tolerance_secs: u64 },

    #[error("no signature matches the expected signature for the payload")]
    Mismatch,

    #[error("payload is not a valid event: {0}")]
    MalformedPayload(String),
}

/// Turns a raw webhook request into a typed event.
///
/// The handler only sees this trait, so tests and alternative providers can
/// substitute their own implementation.
pub trait WebhookVerifier: Send + Sync {
    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError>;
}

/// Production verifier holding the webhook signing secret.
#[derive(Clone)]
pub struct StripeVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl StripeVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Check the header against `payload` at the given wall-clock time.
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        now: u64,
    ) -> Result<(), SignatureError> {
        let header = signature_header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(SignatureError::MissingHeader)?;

        let parsed = parse_signature_header(header)?;

        let age = now.abs_diff(parsed.timestamp);
        if self.tolerance_secs > 0 && age > self.tolerance_secs {
            warn!(
                webhook_time = parsed.timestamp,
                current_time = now,
                age_seconds = age,
                tolerance_seconds = self.tolerance_secs,
                "stripe_signature_stale"
            );
            return Err(SignatureError::TimestampOutsideTolerance {
                age_secs: age,
                tolerance_secs: self.tolerance_secs,
            });
        }

        let expected = compute_signature(&self.secret, parsed.timestamp, payload);

        if parsed
            .signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            Ok(())
        } else {
            warn!(
                candidates = parsed.signatures.len(),
                expected_length = expected.len(),
                "stripe_signature_mismatch"
            );
            Err(SignatureError::Mismatch)
        }
    }
}

impl WebhookVerifier for StripeVerifier {
    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError> {
        self.verify_at(payload, signature_header, unix_now())?;

        let event: Event = serde_json::from_slice(payload)
            .map_err(|e| SignatureError::MalformedPayload(e.to_string()))?;

        Ok(WebhookEvent::from(event))
    }
}

/// The pieces of a `stripe-signature` header we care about.
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: u64,
    signatures: Vec<String>,
}

/// Parse `t=...,v1=...,v1=...`. Unknown schemes such as `v0` are skipped.
fn parse_signature_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };

        match key.trim() {
            "t" => timestamp = Some(value.trim()),
            "v1" => signatures.push(value.trim().to_string()),
            _ => {}
        }
    }

    let raw = timestamp.ok_or_else(|| {
        warn!("stripe_signature_missing_timestamp");
        SignatureError::MissingTimestamp
    })?;

    let timestamp = raw.parse::<u64>().map_err(|_| {
        warn!(timestamp = %raw, "stripe_signature_invalid_timestamp");
        SignatureError::InvalidTimestamp(raw.to_string())
    })?;

    if signatures.is_empty() {
        warn!("stripe_signature_no_v1");
        return Err(SignatureError::NoSignatures);
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// HMAC-SHA256(secret, "{timestamp}.{payload}") as lowercase hex.
fn compute_signature(secret: &str, timestamp: u64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    hex::encode(mac.finalize().into_bytes())
}

/// Build a `stripe-signature` header value for `payload`.
pub fn sign_payload(secret: &str, timestamp: u64, payload: &[u8]) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        compute_signature(secret, timestamp, payload)
    )
}

/// Current time as unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
