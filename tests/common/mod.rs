// Shared test harness: in-memory platform fakes plus a mock Bling API
// server on an ephemeral port. No database is required anywhere.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Form, Router,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use bling_sync::middleware::error_handling::Result;
use bling_sync::models::bling_config::{
    BlingConfig, BlingConfigUpdate, SyncPreferences, TokenSet,
};
use bling_sync::models::platform::{
    Metadata, Order, OrderAddress, OrderLineItem, Product, ProductUpsert, ProductVariant,
    StockLocation, VariantUpsert,
};
use bling_sync::repositories::{ConfigStore, OAuthStateStore};
use bling_sync::services::bling::{BlingClient, TokenManager};
use bling_sync::services::platform::{OrderService, ProductService, StockLocationService};
use bling_sync::AppState;

// ============================================================================
// In-memory stores
// ============================================================================

#[derive(Default)]
pub struct InMemoryConfigStore {
    inner: StdMutex<Option<BlingConfig>>,
}

impl InMemoryConfigStore {
    pub fn seeded(config: BlingConfig) -> Arc<Self> {
        let store = Self::default();
        *store.inner.lock().unwrap() = Some(config);
        Arc::new(store)
    }

    pub fn snapshot(&self) -> Option<BlingConfig> {
        self.inner.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self) -> Result<Option<BlingConfig>> {
        Ok(self.inner.lock().unwrap().clone())
    }

    async fn save(&self, update: BlingConfigUpdate) -> Result<BlingConfig> {
        let mut guard = self.inner.lock().unwrap();
        let mut config = guard.clone().unwrap_or_default();
        config.apply_update(update);
        *guard = Some(config.clone());
        Ok(config)
    }

    async fn store_tokens(&self, tokens: TokenSet) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let mut config = guard.clone().unwrap_or_default();
        config.apply_tokens(tokens);
        *guard = Some(config);
        Ok(())
    }

    async fn store_tokens_if_version(
        &self,
        expected_version: i32,
        tokens: TokenSet,
    ) -> Result<bool> {
        let mut guard = self.inner.lock().unwrap();
        let mut config = guard.clone().unwrap_or_default();
        if config.version != expected_version {
            return Ok(false);
        }
        config.apply_tokens(tokens);
        *guard = Some(config);
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryOAuthStateStore {
    states: StdMutex<HashMap<String, (DateTime<Utc>, bool)>>,
}

#[async_trait]
impl OAuthStateStore for InMemoryOAuthStateStore {
    async fn create_state(&self, state: &str, ttl: Duration) -> Result<()> {
        self.states
            .lock()
            .unwrap()
            .insert(state.to_string(), (Utc::now() + ttl, false));
        Ok(())
    }

    async fn consume_state(&self, state: &str) -> Result<bool> {
        let mut states = self.states.lock().unwrap();
        match states.get_mut(state) {
            Some((expires_at, used)) if !*used && *expires_at > Utc::now() => {
                *used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut states = self.states.lock().unwrap();
        let before = states.len();
        states.retain(|_, (expires_at, _)| *expires_at > Utc::now());
        Ok((before - states.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryProductService {
    products: StdMutex<Vec<Product>>,
    upsert_batches: StdMutex<Vec<Vec<ProductUpsert>>>,
}

impl InMemoryProductService {
    pub fn seeded(products: Vec<Product>) -> Arc<Self> {
        let service = Self::default();
        *service.products.lock().unwrap() = products;
        Arc::new(service)
    }

    pub fn recorded_batches(&self) -> Vec<Vec<ProductUpsert>> {
        self.upsert_batches.lock().unwrap().clone()
    }

    pub fn stored_products(&self) -> Vec<Product> {
        self.products.lock().unwrap().clone()
    }
}

fn apply_upsert(existing: &mut Vec<Product>, upsert: &ProductUpsert, index: usize) -> Product {
    let variants: Vec<ProductVariant> = upsert
        .variants
        .iter()
        .enumerate()
        .map(|(i, variant): (usize, &VariantUpsert)| ProductVariant {
            id: variant
                .id
                .clone()
                .unwrap_or_else(|| format!("variant_gen_{index}_{i}")),
            title: variant.title.clone(),
            sku: variant.sku.clone(),
            barcode: variant.barcode.clone(),
            metadata: variant.metadata.clone(),
        })
        .collect();

    let product = Product {
        id: upsert
            .id
            .clone()
            .unwrap_or_else(|| format!("prod_gen_{index}")),
        title: upsert.title.clone(),
        external_id: Some(upsert.external_id.clone()),
        status: upsert.status.clone(),
        variants,
        metadata: upsert.metadata.clone(),
    };

    if let Some(position) = existing
        .iter()
        .position(|candidate| candidate.external_id.as_deref() == Some(&upsert.external_id))
    {
        existing[position] = product.clone();
    } else {
        existing.push(product.clone());
    }

    product
}

#[async_trait]
impl ProductService for InMemoryProductService {
    async fn list_products_by_external_ids(
        &self,
        external_ids: &[String],
    ) -> Result<Vec<Product>> {
        let products = self.products.lock().unwrap();
        Ok(products
            .iter()
            .filter(|product| {
                product
                    .external_id
                    .as_ref()
                    .map(|id| external_ids.contains(id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn upsert_products(&self, upserts: Vec<ProductUpsert>) -> Result<Vec<Product>> {
        self.upsert_batches.lock().unwrap().push(upserts.clone());

        let mut products = self.products.lock().unwrap();
        let persisted = upserts
            .iter()
            .enumerate()
            .map(|(index, upsert)| apply_upsert(&mut products, upsert, index))
            .collect();
        Ok(persisted)
    }
}

#[derive(Default)]
pub struct InMemoryOrderService {
    orders: StdMutex<HashMap<String, Order>>,
    metadata_updates: StdMutex<Vec<(String, Metadata)>>,
}

impl InMemoryOrderService {
    pub fn seeded(orders: Vec<Order>) -> Arc<Self> {
        let service = Self::default();
        {
            let mut map = service.orders.lock().unwrap();
            for order in orders {
                map.insert(order.id.clone(), order);
            }
        }
        Arc::new(service)
    }

    pub fn recorded_updates(&self) -> Vec<(String, Metadata)> {
        self.metadata_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderService for InMemoryOrderService {
    async fn retrieve_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.lock().unwrap().get(order_id).cloned())
    }

    async fn update_order_metadata(&self, order_id: &str, metadata: Metadata) -> Result<()> {
        self.metadata_updates
            .lock()
            .unwrap()
            .push((order_id.to_string(), metadata.clone()));

        if let Some(order) = self.orders.lock().unwrap().get_mut(order_id) {
            order.metadata = metadata;
        }
        Ok(())
    }
}

pub struct InMemoryStockLocationService {
    pub locations: Vec<StockLocation>,
}

#[async_trait]
impl StockLocationService for InMemoryStockLocationService {
    async fn list_stock_locations(&self) -> Result<Vec<StockLocation>> {
        Ok(self.locations.clone())
    }
}

// ============================================================================
// Mock Bling API server
// ============================================================================

pub struct MockBlingState {
    pub token_requests: usize,
    pub refresh_requests: usize,
    pub fail_token_endpoint: bool,
    pub products: Vec<Value>,
    pub product_requests: usize,
    pub captured_sales: Vec<Value>,
    pub sale_response: Value,
    pub fail_sale: Option<(u16, Value)>,
}

impl Default for MockBlingState {
    fn default() -> Self {
        Self {
            token_requests: 0,
            refresh_requests: 0,
            fail_token_endpoint: false,
            products: Vec::new(),
            product_requests: 0,
            captured_sales: Vec::new(),
            sale_response: json!({"data": {"id": 123}}),
            fail_sale: None,
        }
    }
}

pub type SharedMockState = Arc<Mutex<MockBlingState>>;

async fn mock_token(
    State(state): State<SharedMockState>,
    Form(form): Form<HashMap<String, String>>,
) -> std::result::Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut state = state.lock().await;

    if state.fail_token_endpoint {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "token endpoint down"})),
        ));
    }

    state.token_requests += 1;
    if form.get("grant_type").map(String::as_str) == Some("refresh_token") {
        state.refresh_requests += 1;
    }

    let counter = state.token_requests;
    Ok(Json(json!({
        "access_token": format!("tok_{counter}"),
        "refresh_token": format!("rt_{counter}"),
        "expires_in": 3600,
        "token_type": "Bearer"
    })))
}

async fn mock_products(
    State(state): State<SharedMockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut state = state.lock().await;
    state.product_requests += 1;

    let page: u32 = params
        .get("pagina")
        .and_then(|value| value.parse().ok())
        .unwrap_or(1);

    let data = if page == 1 {
        Value::Array(state.products.clone())
    } else {
        Value::Array(Vec::new())
    };

    Json(json!({ "data": data }))
}

async fn mock_sales(
    State(state): State<SharedMockState>,
    Json(payload): Json<Value>,
) -> std::result::Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut state = state.lock().await;

    if let Some((status, body)) = &state.fail_sale {
        return Err((
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST),
            Json(body.clone()),
        ));
    }

    state.captured_sales.push(payload);
    Ok(Json(state.sale_response.clone()))
}

pub async fn start_mock_bling(state: SharedMockState) -> String {
    let app = Router::new()
        .route("/oauth/token", post(mock_token))
        .route("/produtos", get(mock_products))
        .route("/vendas", post(mock_sales))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{address}")
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestHarness {
    pub state: AppState,
    pub config_store: Arc<InMemoryConfigStore>,
    pub oauth_states: Arc<InMemoryOAuthStateStore>,
    pub products: Arc<InMemoryProductService>,
    pub orders: Arc<InMemoryOrderService>,
    pub mock: SharedMockState,
    pub base_url: String,
}

pub async fn build_harness(
    config: Option<BlingConfig>,
    seeded_products: Vec<Product>,
    seeded_orders: Vec<Order>,
) -> TestHarness {
    let mock: SharedMockState = Arc::new(Mutex::new(MockBlingState::default()));
    let base_url = start_mock_bling(mock.clone()).await;

    let config_store = match config {
        Some(config) => InMemoryConfigStore::seeded(config),
        None => Arc::new(InMemoryConfigStore::default()),
    };
    let oauth_states = Arc::new(InMemoryOAuthStateStore::default());
    let products = InMemoryProductService::seeded(seeded_products);
    let orders = InMemoryOrderService::seeded(seeded_orders);

    let token_manager = Arc::new(TokenManager::new(
        config_store.clone(),
        oauth_states.clone(),
        format!("{base_url}/oauth"),
    ));

    let state = AppState {
        config_store: config_store.clone(),
        oauth_states: oauth_states.clone(),
        products: products.clone(),
        orders: orders.clone(),
        stock_locations: Arc::new(InMemoryStockLocationService {
            locations: vec![
                StockLocation {
                    id: "sloc_main".to_string(),
                    name: "Main Warehouse".to_string(),
                },
                StockLocation {
                    id: "sloc_outlet".to_string(),
                    name: "Outlet".to_string(),
                },
            ],
        }),
        token_manager,
        bling: Arc::new(BlingClient::new(base_url.clone())),
        public_url: "http://localhost:8080".to_string(),
        admin_ui_path: "/app/settings/bling".to_string(),
    };

    TestHarness {
        state,
        config_store,
        oauth_states,
        products,
        orders,
        mock,
        base_url,
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A fully connected configuration whose token was updated `age_secs` ago
/// with a one-hour lifetime.
pub fn connected_config(age_secs: i64) -> BlingConfig {
    BlingConfig {
        client_id: Some("client-id".to_string()),
        client_secret: Some("client-secret".to_string()),
        webhook_secret: None,
        access_token: Some("cached_token".to_string()),
        refresh_token: Some("rt_0".to_string()),
        expires_in: Some(3600),
        token_updated_at: Some(Utc::now() - Duration::seconds(age_secs)),
        sync_preferences: SyncPreferences::default(),
        version: 0,
    }
}

fn string_meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// An order with one Bling-resolvable item and one unresolvable item.
pub fn sample_order(id: &str) -> Order {
    Order {
        id: id.to_string(),
        display_id: Some(1042),
        email: Some("maria@example.com".to_string()),
        currency_code: "brl".to_string(),
        created_at: "2024-03-05T12:00:00Z".parse().unwrap(),
        total: dec!(150.00),
        shipping_total: dec!(20.00),
        discount_total: dec!(0),
        items: vec![
            OrderLineItem {
                id: "item_ok".to_string(),
                title: "Café Torrado".to_string(),
                quantity: 2,
                unit_price: dec!(65.00),
                discount_total: dec!(0),
                variant_sku: None,
                metadata: string_meta(&[("bling_external_id", "B-1")]),
            },
            OrderLineItem {
                id: "item_unmapped".to_string(),
                title: "Brinde".to_string(),
                quantity: 1,
                unit_price: dec!(0.00),
                discount_total: dec!(0),
                variant_sku: None,
                metadata: Metadata::new(),
            },
        ],
        shipping_address: Some(OrderAddress {
            first_name: Some("Maria".to_string()),
            last_name: Some("Silva".to_string()),
            phone: Some("(11) 98765-4321".to_string()),
            address_1: Some("Rua das Flores, 123".to_string()),
            address_2: None,
            city: Some("São Paulo".to_string()),
            province: Some("SP".to_string()),
            postal_code: Some("01310-100".to_string()),
            country_code: Some("br".to_string()),
            metadata: string_meta(&[("document", "529.982.247-25")]),
        }),
        billing_address: None,
        shipping_methods: Vec::new(),
        transactions: Vec::new(),
        metadata: Metadata::new(),
    }
}
