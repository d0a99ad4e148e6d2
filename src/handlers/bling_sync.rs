// Manual sync triggers: product reconciliation and per-order sale export.

use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::middleware::error_handling::{AppError, Result};
use crate::services::bling::{OrderSyncOptions, OrderSyncResult, ProductSyncResult};
use crate::AppState;

/// POST /admin/bling/sync
pub async fn sync_products(State(state): State<AppState>) -> Result<Json<ProductSyncResult>> {
    let service = state.product_sync_service();
    let result = service.sync_products().await.map_err(AppError::from)?;
    Ok(Json(result))
}

/// POST /admin/bling/orders/:id/sync
///
/// Body is optional; `{generate_nfe, generate_shipping_label, force}` all
/// default to false.
pub async fn sync_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    body: Option<Json<OrderSyncOptions>>,
) -> Result<Json<OrderSyncResult>> {
    let options = body.map(|Json(options)| options).unwrap_or_default();

    let service = state.order_sync_service();
    let result = service
        .sync_order(&order_id, options)
        .await
        .map_err(AppError::from)?;

    Ok(Json(result))
}
