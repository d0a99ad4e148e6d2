use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bling_sync::config::AppConfig;
use bling_sync::repositories::{
    PgConfigStore, PgOAuthStateStore, PgOrderService, PgProductService, PgStockLocationService,
};
use bling_sync::services::bling::{BlingClient, TokenManager};
use bling_sync::services::EncryptionService;
use bling_sync::{create_app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "bling_sync=info,tower_http=info,sqlx=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().await?;

    sqlx::migrate!("./migrations")
        .run(&config.database_pool)
        .await?;

    let crypto = EncryptionService::new(&config.encryption_key)
        .map_err(|err| anyhow::anyhow!("Invalid ENCRYPTION_KEY: {err}"))?;

    let config_store = Arc::new(PgConfigStore::new(config.database_pool.clone(), crypto));
    let oauth_states = Arc::new(PgOAuthStateStore::new(config.database_pool.clone()));
    let token_manager = Arc::new(TokenManager::new(
        config_store.clone(),
        oauth_states.clone(),
        config.bling.oauth_base_url.clone(),
    ));

    let state = AppState {
        config_store,
        oauth_states,
        products: Arc::new(PgProductService::new(config.database_pool.clone())),
        orders: Arc::new(PgOrderService::new(config.database_pool.clone())),
        stock_locations: Arc::new(PgStockLocationService::new(config.database_pool.clone())),
        token_manager,
        bling: Arc::new(BlingClient::new(config.bling.api_base_url.clone())),
        public_url: config.public_url.clone(),
        admin_ui_path: config.admin_ui_path.clone(),
    };

    let app = create_app(state);
    let address = config.server_address();

    tracing::info!("Starting bling-sync server on {address}");

    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
