//! Seams onto the host e-commerce platform.
//!
//! The integration only ever touches platform products, orders, and stock
//! locations through these traits. Production wiring uses the Postgres
//! implementations in `repositories`; tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::middleware::error_handling::Result;
use crate::models::platform::{Metadata, Order, Product, ProductUpsert, StockLocation};

#[async_trait]
pub trait ProductService: Send + Sync {
    /// Loads existing products whose external id matches any of the given
    /// Bling identifiers, variants included.
    async fn list_products_by_external_ids(&self, external_ids: &[String])
        -> Result<Vec<Product>>;

    /// Creates or updates products in one batched call. All-or-nothing at
    /// the transport level: a failure here fails the whole batch.
    async fn upsert_products(&self, upserts: Vec<ProductUpsert>) -> Result<Vec<Product>>;
}

#[async_trait]
pub trait OrderService: Send + Sync {
    /// Fetches an order with items, addresses, shipping methods, and
    /// transactions. `None` when the order does not exist.
    async fn retrieve_order(&self, order_id: &str) -> Result<Option<Order>>;

    /// Replaces the order's metadata document. Callers merge before writing
    /// so unrelated keys survive.
    async fn update_order_metadata(&self, order_id: &str, metadata: Metadata) -> Result<()>;
}

#[async_trait]
pub trait StockLocationService: Send + Sync {
    async fn list_stock_locations(&self) -> Result<Vec<StockLocation>>;
}
