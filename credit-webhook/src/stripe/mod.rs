//! Stripe webhook support.
//!
//! - `signature`: verifies the `stripe-signature` header over the raw body
//! - `event`: decodes the verified body into a [`WebhookEvent`]

pub mod event;
pub mod signature;

pub use event::{
    CheckoutSession, Event, WebhookEvent, CHECKOUT_SESSION_COMPLETED, USER_ID_METADATA_KEY,
};
pub use signature::{
    sign_payload, unix_now, SignatureError, StripeVerifier, WebhookVerifier, SIGNATURE_HEADER,
};
