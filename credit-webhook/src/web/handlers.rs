//! Webhook endpoint handlers.
//!
//! The Stripe handler:
//! 1. Verifies the signature over the raw body
//! 2. Dispatches on the event type
//! 3. Credits the user with a single store call
//!
//! Every request finishes in one pass; nothing is retried or queued.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::WebhookError;
use crate::store::{CreditOutcome, CreditPolicy, UserStore};
use crate::stripe::{StripeVerifier, WebhookEvent, WebhookVerifier, SIGNATURE_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn WebhookVerifier>,
    pub store: Arc<dyn UserStore>,
    pub policy: CreditPolicy,
}

impl AppState {
    pub fn new(
        verifier: Arc<dyn WebhookVerifier>,
        store: Arc<dyn UserStore>,
        policy: CreditPolicy,
    ) -> Self {
        Self {
            verifier,
            store,
            policy,
        }
    }

    /// State wired with the production Stripe verifier.
    pub fn from_config(config: &Config, store: Arc<dyn UserStore>) -> Self {
        let verifier = StripeVerifier::new(
            config.stripe_webhook_secret.clone(),
            config.signature_tolerance_secs,
        );
        Self::new(Arc::new(verifier), store, config.credit_policy())
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Stripe Webhook
// =============================================================================

/// Successful end states of a webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Credited {
        user_id: String,
        outcome: CreditOutcome,
    },
    /// Event type we do not act on. Still acknowledged with 200 so Stripe
    /// stops redelivering it.
    Ignored { event_type: String },
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        match self {
            WebhookOutcome::Credited { .. } => (StatusCode::OK, "Success").into_response(),
            WebhookOutcome::Ignored { .. } => (StatusCode::OK, "Invalid event").into_response(),
        }
    }
}

/// Verify, dispatch and apply one webhook delivery.
pub async fn process_webhook(
    state: &AppState,
    payload: &[u8],
    signature: Option<&str>,
) -> Result<WebhookOutcome, WebhookError> {
    let event = state
        .verifier
        .construct_event(payload, signature)
        .map_err(|e| {
            warn!(error = %e, "stripe_signature_invalid");
            WebhookError::from(e)
        })?;

    info!(
        event_id = ?event.event_id(),
        event_type = %event.event_type(),
        "stripe_event_verified"
    );

    let (event_id, session) = match event {
        WebhookEvent::CheckoutSessionCompleted { event_id, session } => (event_id, session),
        WebhookEvent::Unhandled {
            event_id,
            event_type,
        } => {
            info!(event_id = ?event_id, event_type = %event_type, "stripe_event_ignored");
            return Ok(WebhookOutcome::Ignored { event_type });
        }
    };

    let Some(user_id) = session.user_id() else {
        warn!(
            event_id = ?event_id,
            session_id = ?session.id,
            "checkout_session_missing_user_id"
        );
        return Err(WebhookError::InvalidSession);
    };

    info!(event_id = ?event_id, user_id = %user_id, "checkout_session_completed");

    let outcome = state
        .store
        .credit_user(user_id, state.policy)
        .await
        .map_err(|e| {
            error!(event_id = ?event_id, user_id = %user_id, error = %e, "user_credit_failed");
            WebhookError::from(e)
        })?;

    match outcome {
        CreditOutcome::Created { total_credit } => {
            info!(user_id = %user_id, total_credit = total_credit, "user_created")
        }
        CreditOutcome::ToppedUp { total_credit } => {
            info!(user_id = %user_id, total_credit = total_credit, "user_topped_up")
        }
    }

    Ok(WebhookOutcome::Credited {
        user_id: user_id.to_string(),
        outcome,
    })
}

/// Stripe webhook endpoint.
///
/// Takes the body as raw bytes: the signature covers the exact payload, so it
/// must not be parsed before verification.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<WebhookOutcome, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "stripe_webhook_received"
    );

    let result = process_webhook(&state, &body, signature).await;

    match &result {
        Ok(outcome) => info!(outcome = ?outcome, "stripe_webhook_processed"),
        Err(e) => warn!(status = e.status().as_u16(), error = %e, "stripe_webhook_rejected"),
    }

    result
}
