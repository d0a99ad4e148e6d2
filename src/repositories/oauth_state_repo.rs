use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{query, PgPool};

use crate::middleware::error_handling::Result;

/// Server-side storage for OAuth `state` values. Each authorization attempt
/// gets a fresh random state with a short TTL, consumed exactly once on
/// callback, which is what defeats CSRF on the authorization flow.
#[async_trait]
pub trait OAuthStateStore: Send + Sync {
    async fn create_state(&self, state: &str, ttl: Duration) -> Result<()>;

    /// Marks the state used and reports whether it was valid: known,
    /// unexpired, and not previously consumed.
    async fn consume_state(&self, state: &str) -> Result<bool>;

    /// Drops expired rows; returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

pub struct PgOAuthStateStore {
    pool: PgPool,
}

impl PgOAuthStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthStateStore for PgOAuthStateStore {
    async fn create_state(&self, state: &str, ttl: Duration) -> Result<()> {
        let now = Utc::now();

        query(
            r#"
            INSERT INTO bling_oauth_states (state, created_at, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(state)
        .bind(now)
        .bind(now + ttl)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn consume_state(&self, state: &str) -> Result<bool> {
        let result = query(
            r#"
            UPDATE bling_oauth_states
            SET used_at = NOW()
            WHERE state = $1
              AND used_at IS NULL
              AND expires_at > NOW()
            "#,
        )
        .bind(state)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = query("DELETE FROM bling_oauth_states WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
