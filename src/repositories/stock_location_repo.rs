use async_trait::async_trait;
use sqlx::{query, PgPool, Row};

use crate::middleware::error_handling::Result;
use crate::models::platform::StockLocation;
use crate::services::platform::StockLocationService;

pub struct PgStockLocationService {
    pool: PgPool,
}

impl PgStockLocationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StockLocationService for PgStockLocationService {
    async fn list_stock_locations(&self) -> Result<Vec<StockLocation>> {
        let rows = query("SELECT id, name FROM stock_location ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StockLocation {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }
}
