//! Web server module for handling inbound Stripe webhooks.
//!
//! This module provides a thin web server that:
//! - Receives Stripe webhooks
//! - Verifies the signature over the raw body
//! - Credits the paying user
//! - Acknowledges every event type, acting only on completed checkouts

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, process_webhook, stripe_webhook, AppState, HealthResponse, WebhookOutcome,
};

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/webhook", post(stripe_webhook))
        .route("/webhook", post(stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
