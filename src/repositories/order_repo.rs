use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{query, PgPool, Row};

use crate::middleware::error_handling::Result;
use crate::models::platform::{
    Metadata, Order, OrderAddress, OrderLineItem, OrderShippingMethod, OrderTransaction,
};
use crate::services::platform::OrderService;

pub struct PgOrderService {
    pool: PgPool,
}

impl PgOrderService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_address(&self, address_id: Option<String>) -> Result<Option<OrderAddress>> {
        let Some(address_id) = address_id else {
            return Ok(None);
        };

        let row = query(
            r#"
            SELECT first_name, last_name, phone, address_1, address_2,
                   city, province, postal_code, country_code, metadata
            FROM order_address
            WHERE id = $1
            "#,
        )
        .bind(&address_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(OrderAddress {
                first_name: row.try_get("first_name")?,
                last_name: row.try_get("last_name")?,
                phone: row.try_get("phone")?,
                address_1: row.try_get("address_1")?,
                address_2: row.try_get("address_2")?,
                city: row.try_get("city")?,
                province: row.try_get("province")?,
                postal_code: row.try_get("postal_code")?,
                country_code: row.try_get("country_code")?,
                metadata: metadata_from_value(row.try_get("metadata")?),
            })),
            None => Ok(None),
        }
    }

    async fn load_items(&self, order_id: &str) -> Result<Vec<OrderLineItem>> {
        let rows = query(
            r#"
            SELECT id, title, quantity, unit_price, discount_total, variant_sku, metadata
            FROM order_item
            WHERE order_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderLineItem {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    quantity: row.try_get("quantity")?,
                    unit_price: row.try_get::<Decimal, _>("unit_price")?,
                    discount_total: row
                        .try_get::<Option<Decimal>, _>("discount_total")?
                        .unwrap_or_default(),
                    variant_sku: row.try_get("variant_sku")?,
                    metadata: metadata_from_value(row.try_get("metadata")?),
                })
            })
            .collect()
    }

    async fn load_shipping_methods(&self, order_id: &str) -> Result<Vec<OrderShippingMethod>> {
        let rows = query(
            r#"
            SELECT name, amount, metadata
            FROM order_shipping_method
            WHERE order_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderShippingMethod {
                    name: row.try_get("name")?,
                    amount: row
                        .try_get::<Option<Decimal>, _>("amount")?
                        .unwrap_or_default(),
                    metadata: metadata_from_value(row.try_get("metadata")?),
                })
            })
            .collect()
    }

    async fn load_transactions(&self, order_id: &str) -> Result<Vec<OrderTransaction>> {
        let rows = query(
            r#"
            SELECT amount, currency_code, created_at
            FROM order_transaction
            WHERE order_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderTransaction {
                    amount: row.try_get::<Decimal, _>("amount")?,
                    currency_code: row.try_get("currency_code")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OrderService for PgOrderService {
    async fn retrieve_order(&self, order_id: &str) -> Result<Option<Order>> {
        let row = query(
            r#"
            SELECT id, display_id, email, currency_code, created_at,
                   total, shipping_total, discount_total,
                   shipping_address_id, billing_address_id, metadata
            FROM "order"
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let shipping_address_id: Option<String> = row.try_get("shipping_address_id")?;
        let billing_address_id: Option<String> = row.try_get("billing_address_id")?;

        let order = Order {
            id: row.try_get("id")?,
            display_id: row.try_get("display_id")?,
            email: row.try_get("email")?,
            currency_code: row.try_get("currency_code")?,
            created_at: row.try_get("created_at")?,
            total: row
                .try_get::<Option<Decimal>, _>("total")?
                .unwrap_or_default(),
            shipping_total: row
                .try_get::<Option<Decimal>, _>("shipping_total")?
                .unwrap_or_default(),
            discount_total: row
                .try_get::<Option<Decimal>, _>("discount_total")?
                .unwrap_or_default(),
            items: self.load_items(order_id).await?,
            shipping_address: self.load_address(shipping_address_id).await?,
            billing_address: self.load_address(billing_address_id).await?,
            shipping_methods: self.load_shipping_methods(order_id).await?,
            transactions: self.load_transactions(order_id).await?,
            metadata: metadata_from_value(row.try_get("metadata")?),
        };

        Ok(Some(order))
    }

    async fn update_order_metadata(&self, order_id: &str, metadata: Metadata) -> Result<()> {
        query(r#"UPDATE "order" SET metadata = $2, updated_at = NOW() WHERE id = $1"#)
            .bind(order_id)
            .bind(Value::Object(metadata))
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn metadata_from_value(value: Option<Value>) -> Metadata {
    value
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default()
}
