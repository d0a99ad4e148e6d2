// Bling OAuth2 token lifecycle
// Authorization-code exchange, refresh-before-expiry, and concurrent-safe
// token retrieval. Refreshes are serialized behind an in-process mutex and
// persisted with an optimistic version check so a concurrent process can
// never clobber a newer token with a stale one.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::middleware::error_handling::AppError;
use crate::models::bling_config::{BlingConfig, TokenSet};
use crate::repositories::config_repo::ConfigStore;
use crate::repositories::oauth_state_repo::OAuthStateStore;

/// How long an authorization `state` stays valid.
const STATE_TTL_MINUTES: i64 = 10;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Bling client ID is not configured. Save credentials first.")]
    ClientIdMissing,

    #[error("Bling access token not found. Authenticate with Bling first.")]
    NotAuthenticated,

    #[error("Missing Bling credentials or refresh token for renewal.")]
    RefreshCredentialsMissing,

    #[error("Failed to refresh Bling access token: {0}")]
    RefreshFailed(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::ClientIdMissing => AppError::BadRequest(err.to_string()),
            TokenError::NotAuthenticated
            | TokenError::RefreshCredentialsMissing
            | TokenError::RefreshFailed(_) => AppError::Unauthorized(err.to_string()),
            TokenError::Store(inner) => inner,
        }
    }
}

pub type Result<T> = std::result::Result<T, TokenError>;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

// ============================================================================
// Token Manager
// ============================================================================

pub struct TokenManager {
    config_store: Arc<dyn ConfigStore>,
    oauth_states: Arc<dyn OAuthStateStore>,
    http: Client,
    oauth_base_url: String,
    /// Serializes the read-check-refresh-write sequence within this process.
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        oauth_states: Arc<dyn OAuthStateStore>,
        oauth_base_url: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            config_store,
            oauth_states,
            http,
            oauth_base_url: oauth_base_url.into().trim_end_matches('/').to_string(),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Builds the consent-screen URL with a fresh random `state`, persisted
    /// server-side with a short TTL for callback validation.
    pub async fn authorization_url(&self, redirect_uri: &str) -> Result<String> {
        let config = self.config_store.load().await?.unwrap_or_default();
        let client_id = config.client_id.ok_or(TokenError::ClientIdMissing)?;

        // Opportunistic cleanup keeps the state table from accumulating
        // abandoned authorization attempts.
        let purged = self.oauth_states.purge_expired().await?;
        if purged > 0 {
            tracing::debug!("Purged {purged} expired OAuth states");
        }

        let state = generate_state_token();
        self.oauth_states
            .create_state(&state, chrono::Duration::minutes(STATE_TTL_MINUTES))
            .await?;

        let mut url = url::Url::parse(&format!("{}/authorize", self.oauth_base_url))
            .map_err(|e| TokenError::RefreshFailed(format!("Invalid OAuth base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", &state);

        Ok(url.to_string())
    }

    /// Exchanges an authorization code for a token triple and persists it.
    /// Returns `false` on any failure (invalid state, missing credentials,
    /// exchange error); the cause is logged, never thrown, so the callback
    /// route can redirect with a friendly error.
    pub async fn handle_oauth_callback(&self, code: &str, state: &str) -> bool {
        match self.try_oauth_callback(code, state).await {
            Ok(()) => {
                tracing::info!("Bling OAuth token saved successfully");
                true
            }
            Err(err) => {
                tracing::error!("Bling OAuth callback failed: {err}");
                false
            }
        }
    }

    async fn try_oauth_callback(&self, code: &str, state: &str) -> Result<()> {
        if !self.oauth_states.consume_state(state).await? {
            return Err(TokenError::RefreshFailed(
                "Unknown, expired, or already used OAuth state".to_string(),
            ));
        }

        let config = self.config_store.load().await?.unwrap_or_default();
        let (client_id, client_secret) = match (config.client_id, config.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(TokenError::RefreshFailed(
                    "Bling client ID or secret not configured".to_string(),
                ))
            }
        };

        let response = self
            .request_token(
                &client_id,
                &client_secret,
                &[("grant_type", "authorization_code"), ("code", code)],
            )
            .await?;

        self.config_store
            .store_tokens(TokenSet {
                access_token: response.access_token,
                refresh_token: response.refresh_token,
                expires_in: response.expires_in,
                token_updated_at: Utc::now(),
            })
            .await?;

        Ok(())
    }

    /// Returns a currently valid access token. Serves the cached token while
    /// inside the expiry window; otherwise performs a refresh-token exchange
    /// and persists the new triple. Errors here mean re-authentication is
    /// required.
    pub async fn access_token(&self) -> Result<String> {
        let config = self.config_store.load().await?.unwrap_or_default();

        if config.access_token.is_none()
            || config.token_updated_at.is_none()
            || config.expires_in.is_none()
        {
            return Err(TokenError::NotAuthenticated);
        }

        if config.token_is_fresh(Utc::now()) {
            return config.access_token.ok_or(TokenError::NotAuthenticated);
        }

        // Stale: serialize the refresh. Whoever gets the lock first refreshes;
        // everyone queued behind finds a fresh token on the re-check.
        let _guard = self.refresh_lock.lock().await;

        let config = self.config_store.load().await?.unwrap_or_default();
        if config.token_is_fresh(Utc::now()) {
            return config.access_token.ok_or(TokenError::NotAuthenticated);
        }

        self.refresh(config).await
    }

    async fn refresh(&self, config: BlingConfig) -> Result<String> {
        let (client_id, client_secret, refresh_token) = match (
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
            config.refresh_token.as_deref(),
        ) {
            (Some(id), Some(secret), Some(token)) => (id, secret, token),
            _ => return Err(TokenError::RefreshCredentialsMissing),
        };

        tracing::info!("Bling access token expired, refreshing");

        let response = self
            .request_token(
                client_id,
                client_secret,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ],
            )
            .await?;

        let tokens = TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
            token_updated_at: Utc::now(),
        };

        let applied = self
            .config_store
            .store_tokens_if_version(config.version, tokens.clone())
            .await?;

        if applied {
            tracing::info!("Bling access token refreshed successfully");
            return Ok(tokens.access_token);
        }

        // A concurrent process refreshed first; its token is the valid one.
        tracing::warn!("Concurrent Bling token refresh detected, reusing stored token");
        let current = self.config_store.load().await?.unwrap_or_default();
        current.access_token.ok_or(TokenError::NotAuthenticated)
    }

    async fn request_token(
        &self,
        client_id: &str,
        client_secret: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let credentials = BASE64.encode(format!("{client_id}:{client_secret}"));
        let url = format!("{}/token", self.oauth_base_url);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Basic {credentials}"))
            .form(form)
            .send()
            .await
            .map_err(|err| TokenError::RefreshFailed(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::RefreshFailed(format!(
                "Bling token endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|err| TokenError::RefreshFailed(err.to_string()))
    }
}

/// 32 random bytes, URL-safe base64. Unique per authorization attempt.
fn generate_state_token() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}
