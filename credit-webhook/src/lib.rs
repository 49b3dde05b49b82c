//! Credit webhook - Stripe checkout receiver that tops up user credit.
//!
//! ## Request flow
//!
//! ```text
//! raw body + stripe-signature → StripeVerifier → WebhookEvent → UserStore::credit_user → response
//! ```
//!
//! Only `checkout.session.completed` changes state. A user seen for the first
//! time starts with the initial credit; every later checkout adds the top-up.

pub mod config;
pub mod error;
pub mod store;
pub mod stripe;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use error::WebhookError;
pub use store::{
    CreditOutcome, CreditPolicy, MemoryUserStore, SqliteUserStore, StoreError, User, UserStore,
};
pub use stripe::{StripeVerifier, WebhookEvent, WebhookVerifier};
pub use web::{router, AppState, WebhookOutcome};
