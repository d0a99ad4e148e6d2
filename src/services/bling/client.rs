// Bling REST API client
// Thin authorized wrapper over the v3 API: paged product catalog reads and
// sale creation. Error bodies are unwrapped to the most specific message
// available so callers can surface them directly.

use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::services::bling::token_manager::{TokenError, TokenManager};

/// Default page size for catalog reads.
const PRODUCTS_PAGE_LIMIT: u32 = 100;
/// Hard upper bound on catalog pages per sync pass.
const PRODUCTS_PAGE_CAP: u32 = 500;
/// Bounded retry for transient catalog-read failures.
const FETCH_MAX_ATTEMPTS: u32 = 3;
const FETCH_BASE_BACKOFF_MS: u64 = 200;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum BlingApiError {
    /// Non-success response; `message` is the API body's `message` field
    /// when present, else the raw body, else the canonical status reason.
    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("Failed to communicate with the Bling API: {0}")]
    Network(#[from] reqwest::Error),
}

impl BlingApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BlingApiError::Api { status, .. } => Some(*status),
            BlingApiError::Network(err) => err.status(),
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            BlingApiError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            BlingApiError::Network(err) => err.is_timeout() || err.is_connect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BlingApiError>;

/// Builds the error for a non-success response, preferring the JSON body's
/// `message` field, then the raw body, then the status reason.
pub(crate) async fn api_error_from_response(response: Response) -> BlingApiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| {
            if body.trim().is_empty() {
                None
            } else {
                Some(body.clone())
            }
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Bling API request failed")
                .to_string()
        });

    BlingApiError::Api { status, message }
}

// ============================================================================
// Client
// ============================================================================

pub struct BlingClient {
    http: Client,
    api_base_url: String,
}

impl BlingClient {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Binds the client to an access token for the duration of one
    /// operation. Tokens are resolved per call site so a refresh mid-sync
    /// picks up the new credential on the next operation.
    pub fn authorize(&self, access_token: String) -> AuthorizedBlingClient<'_> {
        AuthorizedBlingClient {
            client: self,
            access_token,
        }
    }

    /// Convenience wrapper: resolves a currently valid access token (cached
    /// or refreshed) and returns a client bound to it.
    pub async fn authorized(
        &self,
        tokens: &TokenManager,
    ) -> std::result::Result<AuthorizedBlingClient<'_>, TokenError> {
        Ok(self.authorize(tokens.access_token().await?))
    }
}

pub struct AuthorizedBlingClient<'a> {
    client: &'a BlingClient,
    access_token: String,
}

impl AuthorizedBlingClient<'_> {
    /// One page of `GET /produtos`. Returns the raw product objects from the
    /// response's `data` array; an absent or non-array `data` yields an
    /// empty page.
    pub async fn fetch_products_page(&self, page: u32, limit: u32) -> Result<Vec<Value>> {
        let url = format!("{}/produtos", self.client.api_base_url);

        let response = self
            .client
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .query(&[("pagina", page.to_string()), ("limite", limit.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error_from_response(response).await);
        }

        let body: Value = response.json().await?;
        let products = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(products)
    }

    /// Full catalog read. Pages until a short page, retrying each page a
    /// bounded number of times with exponential backoff on transient
    /// failures (5xx, 429, timeouts).
    pub async fn fetch_all_products(&self) -> Result<Vec<Value>> {
        let mut products = Vec::new();

        for page in 1..=PRODUCTS_PAGE_CAP {
            let batch = self
                .fetch_products_page_with_retry(page, PRODUCTS_PAGE_LIMIT)
                .await?;
            let batch_len = batch.len();
            products.extend(batch);

            if batch_len < PRODUCTS_PAGE_LIMIT as usize {
                break;
            }
        }

        Ok(products)
    }

    async fn fetch_products_page_with_retry(&self, page: u32, limit: u32) -> Result<Vec<Value>> {
        let mut attempt = 0;
        loop {
            match self.fetch_products_page(page, limit).await {
                Ok(batch) => return Ok(batch),
                Err(err) if err.is_transient() && attempt + 1 < FETCH_MAX_ATTEMPTS => {
                    let backoff =
                        Duration::from_millis(FETCH_BASE_BACKOFF_MS << attempt);
                    tracing::warn!(
                        page,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient Bling catalog failure, retrying: {err}"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Minimal reachability check: a one-item catalog read.
    pub async fn probe(&self) -> Result<()> {
        self.fetch_products_page(1, 1).await.map(|_| ())
    }

    /// `POST /vendas`. Deliberately not retried: Bling does not deduplicate
    /// sales, so a blind retry could create duplicates.
    pub async fn create_sale(&self, payload: &Value) -> Result<Value> {
        let url = format!("{}/vendas", self.client.api_base_url);

        let response = self
            .client
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error_from_response(response).await);
        }

        Ok(response.json().await?)
    }
}
