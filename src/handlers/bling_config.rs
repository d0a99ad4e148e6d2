// Configuration, health, and connection-test endpoints.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::middleware::error_handling::Result;
use crate::models::bling_config::{BlingConfigUpdate, SyncPreferences, SyncPreferencesUpdate};
use crate::models::platform::StockLocation;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub client_id: String,
    /// Secrets are never echoed back; the UI only learns whether one is set.
    pub has_client_secret: bool,
    pub has_webhook_secret: bool,
    pub is_connected: bool,
    pub sync_preferences: SyncPreferences,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateConfigRequest {
    #[validate(length(max = 255))]
    pub client_id: Option<String>,
    #[validate(length(max = 255))]
    pub client_secret: Option<String>,
    #[validate(length(max = 255))]
    pub webhook_secret: Option<String>,
    pub sync_preferences: Option<SyncPreferencesUpdate>,
}

/// GET /admin/bling/config
pub async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigResponse>> {
    let config = state.config_store.load().await?.unwrap_or_default();

    Ok(Json(ConfigResponse {
        client_id: config.client_id.unwrap_or_default(),
        has_client_secret: config.client_secret.is_some(),
        has_webhook_secret: config.webhook_secret.is_some(),
        is_connected: config.access_token.is_some(),
        sync_preferences: config.sync_preferences,
    }))
}

/// POST /admin/bling/config
pub async fn update_config(
    State(state): State<AppState>,
    Json(request): Json<UpdateConfigRequest>,
) -> Result<Json<serde_json::Value>> {
    request.validate()?;

    state
        .config_store
        .save(BlingConfigUpdate {
            client_id: request.client_id,
            client_secret: request.client_secret,
            webhook_secret: request.webhook_secret,
            sync_preferences: request.sync_preferences,
        })
        .await?;

    Ok(Json(json!({ "message": "Bling settings saved successfully." })))
}

/// GET /admin/bling/health
///
/// Always 200; the body distinguishes connected, never-connected, and
/// broken-token states so the UI can prompt re-authorization.
pub async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let config = state.config_store.load().await?.unwrap_or_default();

    if config.access_token.is_none() {
        return Ok(Json(json!({ "status": "not_connected" })));
    }

    match state.token_manager.access_token().await {
        Ok(_) => Ok(Json(json!({ "status": "ok" }))),
        Err(err) => {
            tracing::error!("Bling health check failed: {err}");
            Ok(Json(json!({ "status": "error", "message": err.to_string() })))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
}

/// GET /admin/bling/test-connection
pub async fn test_connection(State(state): State<AppState>) -> Json<TestConnectionResponse> {
    let response = match state.bling.authorized(&state.token_manager).await {
        Ok(client) => match client.probe().await {
            Ok(()) => TestConnectionResponse {
                success: true,
                message: "Successfully connected to Bling.".to_string(),
            },
            Err(err) => TestConnectionResponse {
                success: false,
                message: format!("Connection test failed: {err}"),
            },
        },
        Err(err) => TestConnectionResponse {
            success: false,
            message: err.to_string(),
        },
    };

    Json(response)
}

#[derive(Debug, Serialize)]
pub struct StockLocationsResponse {
    pub locations: Vec<StockLocation>,
}

/// GET /admin/bling/inventory/locations
///
/// Platform stock locations for the deposit-mapping UI.
pub async fn list_locations(State(state): State<AppState>) -> Result<Json<StockLocationsResponse>> {
    let locations = state.stock_locations.list_stock_locations().await?;
    Ok(Json(StockLocationsResponse { locations }))
}
