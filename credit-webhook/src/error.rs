//! Errors that end a webhook request, and the responses they map to.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;
use crate::stripe::SignatureError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("checkout session has no userId in its metadata")]
    InvalidSession,

    #[error("user store failed: {0}")]
    Store(#[from] StoreError),
}

/// JSON body for signature failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature(_) | WebhookError::InvalidSession => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            WebhookError::InvalidSignature(_) => (
                status,
                Json(ErrorResponse {
                    error: "Invalid Signature",
                }),
            )
                .into_response(),
            WebhookError::InvalidSession => (status, "Invalid session").into_response(),
            // Store details stay in the logs.
            WebhookError::Store(_) => (status, "Invalid User not authorized").into_response(),
        }
    }
}
