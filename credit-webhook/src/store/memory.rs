//! In-process user store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CreditOutcome, CreditPolicy, StoreError, User, UserStore};
use crate::stripe::unix_now;

/// Map-backed store. The whole read-modify-write runs under one lock.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user with a given balance.
    pub async fn insert(&self, user_id: &str, total_credit: i64) {
        let now = unix_now() as i64;
        self.users.lock().await.insert(
            user_id.to_string(),
            User {
                user_id: user_id.to_string(),
                total_credit,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().await.get(user_id).cloned())
    }

    async fn credit_user(
        &self,
        user_id: &str,
        policy: CreditPolicy,
    ) -> Result<CreditOutcome, StoreError> {
        let now = unix_now() as i64;
        let mut users = self.users.lock().await;

        match users.get_mut(user_id) {
            Some(user) => {
                user.total_credit = user
                    .total_credit
                    .checked_add(policy.top_up_credit)
                    .ok_or_else(|| StoreError::Unavailable("credit overflow".to_string()))?;
                user.updated_at = now;
                Ok(CreditOutcome::ToppedUp {
                    total_credit: user.total_credit,
                })
            }
            None => {
                users.insert(
                    user_id.to_string(),
                    User {
                        user_id: user_id.to_string(),
                        total_credit: policy.initial_credit,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(CreditOutcome::Created {
                    total_credit: policy.initial_credit,
                })
            }
        }
    }
}
