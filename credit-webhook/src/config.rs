//! Configuration module for environment variable parsing.
//!
//! The two Stripe secrets are required; everything else falls back to a default.

use std::env;

use thiserror::Error;
use tracing::warn;

use crate::store::CreditPolicy;

/// Special `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Stripe API secret key
    pub stripe_secret_key: String,

    /// Stripe webhook signing secret (`whsec_...`)
    pub stripe_webhook_secret: String,

    /// Allowed clock skew in seconds between the signature timestamp and now
    pub signature_tolerance_secs: u64,

    /// sqlx connection URL, or `memory`
    pub database_url: String,

    /// Port for the web server to listen on
    pub port: u16,

    /// Credit granted when a user is first seen
    pub initial_credit: i64,

    /// Credit added on every later completed checkout
    pub top_up_credit: i64,
}

// Secrets stay out of logs and panics.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("stripe_secret_key", &"<redacted>")
            .field("stripe_webhook_secret", &"<redacted>")
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .field("database_url", &self.database_url)
            .field("port", &self.port)
            .field("initial_credit", &self.initial_credit)
            .field("top_up_credit", &self.top_up_credit)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let initial_credit = parse_or("INITIAL_CREDIT", 20_000i64)?;
        let top_up_credit = parse_or("TOP_UP_CREDIT", 10_000i64)?;

        for (name, value) in [("INITIAL_CREDIT", initial_credit), ("TOP_UP_CREDIT", top_up_credit)] {
            if value < 0 {
                return Err(ConfigError::Invalid {
                    name,
                    value: value.to_string(),
                });
            }
        }

        Ok(Config {
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            signature_tolerance_secs: parse_or("STRIPE_SIGNATURE_TOLERANCE", 300)?,
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "sqlite:credits.db?mode=rwc".to_string()),
            port: parse_or("PORT", 8080)?,
            initial_credit,
            top_up_credit,
        })
    }

    /// Credit amounts applied by the webhook handler.
    pub fn credit_policy(&self) -> CreditPolicy {
        CreditPolicy {
            initial_credit: self.initial_credit,
            top_up_credit: self.top_up_credit,
        }
    }

    /// Whether the service should run against the in-process store.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.eq_ignore_ascii_case(MEMORY_DATABASE_URL)
    }
}

/// Read a required, non-blank variable.
fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// Parse an optional variable, using `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    let raw = match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return Ok(default),
    };

    raw.trim().parse().map_err(|_| {
        warn!(env_var = name, value = %raw, "config_invalid_value");
        ConfigError::Invalid { name, value: raw }
    })
}
