use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, PgPool, Row};

use crate::middleware::error_handling::Result;
use crate::models::bling_config::{
    BlingConfig, BlingConfigUpdate, SyncPreferences, SyncPreferencesUpdate, TokenSet,
    BLING_CONFIG_ID,
};
use crate::services::encryption_service::EncryptionService;

/// Persistence seam for the singleton Bling configuration row. Exactly one
/// logical row exists; it is created on first save and never deleted.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Loads the configuration with secrets decrypted and preferences
    /// merged over defaults. `None` until the first save.
    async fn load(&self) -> Result<Option<BlingConfig>>;

    /// Applies a credential/preference update, creating the row if needed.
    async fn save(&self, update: BlingConfigUpdate) -> Result<BlingConfig>;

    /// Persists a token triple unconditionally (authorization-code
    /// exchange). Bumps the version counter.
    async fn store_tokens(&self, tokens: TokenSet) -> Result<()>;

    /// Persists a token triple only when the stored version still matches
    /// `expected_version`. Returns `false` when a concurrent refresh won the
    /// race, in which case the caller should reuse the stored token.
    async fn store_tokens_if_version(&self, expected_version: i32, tokens: TokenSet)
        -> Result<bool>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

const SELECT_COLUMNS: &str = "client_id, client_secret, webhook_secret, access_token, \
     refresh_token, expires_in, token_updated_at, sync_preferences, version";

pub struct PgConfigStore {
    pool: PgPool,
    crypto: EncryptionService,
}

impl PgConfigStore {
    pub fn new(pool: PgPool, crypto: EncryptionService) -> Self {
        Self { pool, crypto }
    }

    fn decrypt_opt(&self, value: Option<String>) -> Result<Option<String>> {
        match value {
            Some(ciphertext) if !ciphertext.is_empty() => {
                Ok(Some(self.crypto.decrypt(&ciphertext)?))
            }
            _ => Ok(None),
        }
    }

    fn encrypt_opt(&self, value: Option<&str>) -> Result<Option<String>> {
        match value {
            Some(plaintext) => Ok(Some(self.crypto.encrypt(plaintext)?)),
            None => Ok(None),
        }
    }

    fn config_from_row(&self, row: sqlx::postgres::PgRow) -> Result<BlingConfig> {
        let stored_preferences: Option<serde_json::Value> = row.try_get("sync_preferences")?;
        let preferences = stored_preferences
            .and_then(|value| serde_json::from_value::<SyncPreferencesUpdate>(value).ok())
            .map(|update| SyncPreferences::merge(&update, None))
            .unwrap_or_default();

        Ok(BlingConfig {
            client_id: row.try_get("client_id")?,
            client_secret: self.decrypt_opt(row.try_get("client_secret")?)?,
            webhook_secret: self.decrypt_opt(row.try_get("webhook_secret")?)?,
            access_token: self.decrypt_opt(row.try_get("access_token")?)?,
            refresh_token: self.decrypt_opt(row.try_get("refresh_token")?)?,
            expires_in: row.try_get("expires_in")?,
            token_updated_at: row.try_get("token_updated_at")?,
            sync_preferences: preferences,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn load(&self) -> Result<Option<BlingConfig>> {
        let row = query(&format!(
            "SELECT {SELECT_COLUMNS} FROM bling_config WHERE id = $1"
        ))
        .bind(BLING_CONFIG_ID)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.config_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, update: BlingConfigUpdate) -> Result<BlingConfig> {
        let mut config = self.load().await?.unwrap_or_default();
        config.apply_update(update);

        let preferences_json = serde_json::to_value(&config.sync_preferences)?;
        let now = Utc::now();

        query(
            r#"
            INSERT INTO bling_config (
                id, client_id, client_secret, webhook_secret, sync_preferences,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (id) DO UPDATE SET
                client_id = EXCLUDED.client_id,
                client_secret = EXCLUDED.client_secret,
                webhook_secret = EXCLUDED.webhook_secret,
                sync_preferences = EXCLUDED.sync_preferences,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(BLING_CONFIG_ID)
        .bind(&config.client_id)
        .bind(self.encrypt_opt(config.client_secret.as_deref())?)
        .bind(self.encrypt_opt(config.webhook_secret.as_deref())?)
        .bind(&preferences_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(config)
    }

    async fn store_tokens(&self, tokens: TokenSet) -> Result<()> {
        query(
            r#"
            UPDATE bling_config
            SET access_token = $2,
                refresh_token = $3,
                expires_in = $4,
                token_updated_at = $5,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(BLING_CONFIG_ID)
        .bind(self.encrypt_opt(Some(&tokens.access_token))?)
        .bind(self.encrypt_opt(Some(&tokens.refresh_token))?)
        .bind(tokens.expires_in)
        .bind(tokens.token_updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn store_tokens_if_version(
        &self,
        expected_version: i32,
        tokens: TokenSet,
    ) -> Result<bool> {
        let result = query(
            r#"
            UPDATE bling_config
            SET access_token = $2,
                refresh_token = $3,
                expires_in = $4,
                token_updated_at = $5,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(BLING_CONFIG_ID)
        .bind(self.encrypt_opt(Some(&tokens.access_token))?)
        .bind(self.encrypt_opt(Some(&tokens.refresh_token))?)
        .bind(tokens.expires_in)
        .bind(tokens.token_updated_at)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
