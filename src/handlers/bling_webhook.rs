// Inbound Bling webhook: HMAC-verified trigger for a catalog/stock re-sync.

use axum::{body::Bytes, extract::State, http::HeaderMap, response::Json};
use serde_json::{json, Value};

use crate::middleware::error_handling::{AppError, Result};
use crate::services::webhook_security::{verify_signature, SIGNATURE_HEADER};
use crate::AppState;

/// POST /webhooks/bling
///
/// When a webhook secret is configured, the `x-bling-signature` header must
/// carry the HMAC-SHA256 of the raw body; a missing or wrong signature is a
/// hard 401 and nothing is processed. Without a configured secret the check
/// is skipped entirely, a documented trust-on-first-use weakness.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let config = state.config_store.load().await?.unwrap_or_default();

    if let Some(secret) = config.webhook_secret.as_deref() {
        let Some(signature) = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            tracing::warn!("Bling webhook received without a signature, rejecting");
            return Err(AppError::Unauthorized("Missing webhook signature.".to_string()));
        };

        if !verify_signature(secret, &body, signature) {
            tracing::warn!("Bling webhook signature mismatch, rejecting");
            return Err(AppError::Unauthorized("Invalid webhook signature.".to_string()));
        }
    }

    if let Ok(event) = serde_json::from_slice::<Value>(&body) {
        let topic = event.get("topic").and_then(Value::as_str).unwrap_or("?");
        let kind = event.get("event").and_then(Value::as_str).unwrap_or("?");
        tracing::info!("Received Bling webhook event: {topic}.{kind}");
    }

    tracing::info!("Bling webhook accepted, starting catalog/stock re-sync");

    let service = state.product_sync_service();
    service.sync_products().await.map_err(AppError::from)?;

    Ok(Json(json!({ "received": true })))
}
