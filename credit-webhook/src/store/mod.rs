//! User credit storage.
//!
//! The webhook handler talks to a [`UserStore`]. Two implementations exist:
//! - [`SqliteUserStore`]: sqlx-backed, used in production
//! - [`MemoryUserStore`]: in-process map, used by tests and `DATABASE_URL=memory`

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryUserStore;
pub use sqlite::SqliteUserStore;

/// A user and their credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: String,
    pub total_credit: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// How much credit a completed checkout is worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPolicy {
    /// Balance a user starts with on their first checkout
    pub initial_credit: i64,
    /// Amount added on every later checkout
    pub top_up_credit: i64,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            initial_credit: 20_000,
            top_up_credit: 10_000,
        }
    }
}

/// Which branch a credit operation took, with the resulting balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Created { total_credit: i64 },
    ToppedUp { total_credit: i64 },
}

impl CreditOutcome {
    pub fn total_credit(&self) -> i64 {
        match self {
            CreditOutcome::Created { total_credit } | CreditOutcome::ToppedUp { total_credit } => {
                *total_credit
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Create the user with `policy.initial_credit`, or add
    /// `policy.top_up_credit` to an existing balance, as one atomic step.
    async fn credit_user(
        &self,
        user_id: &str,
        policy: CreditPolicy,
    ) -> Result<CreditOutcome, StoreError>;
}
