pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    bling_config::{get_config, health, list_locations, test_connection, update_config},
    bling_oauth::{authorize, oauth_callback},
    bling_sync::{sync_order, sync_products},
    bling_webhook::webhook,
};
use crate::repositories::{ConfigStore, OAuthStateStore};
use crate::services::bling::{BlingClient, OrderSyncService, ProductSyncService, TokenManager};
use crate::services::platform::{OrderService, ProductService, StockLocationService};

/// Shared wiring behind every route. Platform collaborators and stores are
/// trait objects so tests can run the full router against in-memory fakes
/// and a mock Bling server.
#[derive(Clone)]
pub struct AppState {
    pub config_store: Arc<dyn ConfigStore>,
    pub oauth_states: Arc<dyn OAuthStateStore>,
    pub products: Arc<dyn ProductService>,
    pub orders: Arc<dyn OrderService>,
    pub stock_locations: Arc<dyn StockLocationService>,
    pub token_manager: Arc<TokenManager>,
    pub bling: Arc<BlingClient>,
    pub public_url: String,
    pub admin_ui_path: String,
}

impl AppState {
    pub fn product_sync_service(&self) -> ProductSyncService {
        ProductSyncService::new(
            self.config_store.clone(),
            self.products.clone(),
            self.token_manager.clone(),
            self.bling.clone(),
        )
    }

    pub fn order_sync_service(&self) -> OrderSyncService {
        OrderSyncService::new(
            self.config_store.clone(),
            self.orders.clone(),
            self.token_manager.clone(),
            self.bling.clone(),
            Arc::new(self.product_sync_service()),
        )
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest(
            "/admin/bling",
            Router::new()
                .route("/authorize", get(authorize))
                .route("/oauth/callback", get(oauth_callback))
                .route("/config", get(get_config))
                .route("/config", post(update_config))
                .route("/health", get(health))
                .route("/test-connection", get(test_connection))
                .route("/inventory/locations", get(list_locations))
                .route("/sync", post(sync_products))
                .route("/orders/:id/sync", post(sync_order)),
        )
        .nest(
            "/webhooks",
            Router::new().route("/bling", post(webhook)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
