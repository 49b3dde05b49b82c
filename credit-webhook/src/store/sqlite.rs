//! SQLite-backed user store.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use tracing::info;

use super::{CreditOutcome, CreditPolicy, StoreError, User, UserStore};
use crate::stripe::unix_now;

const CREATE_USERS_TABLE: &str = "CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY NOT NULL,
    total_credit INTEGER NOT NULL CHECK (total_credit >= 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
)";

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `url` and make sure the schema exists.
    ///
    /// `sqlite::memory:` databases live per connection, so they get a single
    /// connection that is never recycled.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        Self::connect_with(options, max_connections).await
    }

    pub async fn connect_with(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_USERS_TABLE).execute(&self.pool).await?;
        info!("sqlite_schema_ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn add_credit(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
        amount: i64,
        now: i64,
    ) -> Result<Option<i64>, StoreError> {
        let total: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET total_credit = total_credit + ?, updated_at = ?
             WHERE user_id = ? RETURNING total_credit",
        )
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(total)
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, total_credit, created_at, updated_at FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| User {
            user_id: r.get("user_id"),
            total_credit: r.get("total_credit"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn credit_user(
        &self,
        user_id: &str,
        policy: CreditPolicy,
    ) -> Result<CreditOutcome, StoreError> {
        let now = unix_now() as i64;
        let mut tx = self.pool.begin().await?;

        // The UPDATE takes the write lock first, so nothing else can insert
        // this user between the two statements.
        let outcome = match Self::add_credit(&mut tx, user_id, policy.top_up_credit, now).await? {
            Some(total_credit) => CreditOutcome::ToppedUp { total_credit },
            None => {
                let inserted: Option<i64> = sqlx::query_scalar(
                    "INSERT INTO users (user_id, total_credit, created_at, updated_at)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT(user_id) DO NOTHING
                     RETURNING total_credit",
                )
                .bind(user_id)
                .bind(policy.initial_credit)
                .bind(now)
                .bind(now)
                .fetch_optional(&mut *tx)
                .await?;

                match inserted {
                    Some(total_credit) => CreditOutcome::Created { total_credit },
                    None => {
                        let total_credit =
                            Self::add_credit(&mut tx, user_id, policy.top_up_credit, now)
                                .await?
                                .ok_or_else(|| {
                                    StoreError::Unavailable(format!(
                                        "user {} vanished during credit",
                                        user_id
                                    ))
                                })?;
                        CreditOutcome::ToppedUp { total_credit }
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}
