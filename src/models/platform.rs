use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Free-form metadata bag used by platform entities. Sync state is written
/// here under the `bling` key rather than into a dedicated table, so the
/// last sync outcome stays queryable straight from the order.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Products
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub external_id: Option<String>,
    pub status: String,
    pub variants: Vec<ProductVariant>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Nested create-or-update payload for the platform's product service.
/// `id` present means update in place; absent means create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductUpsert {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub external_id: String,
    pub status: String,
    pub thumbnail: Option<String>,
    pub images: Vec<String>,
    pub variants: Vec<VariantUpsert>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantUpsert {
    pub id: Option<String>,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub metadata: Metadata,
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub display_id: Option<i64>,
    pub email: Option<String>,
    pub currency_code: String,
    pub created_at: DateTime<Utc>,
    pub total: Decimal,
    pub shipping_total: Decimal,
    pub discount_total: Decimal,
    pub items: Vec<OrderLineItem>,
    pub shipping_address: Option<OrderAddress>,
    pub billing_address: Option<OrderAddress>,
    pub shipping_methods: Vec<OrderShippingMethod>,
    pub transactions: Vec<OrderTransaction>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: String,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_total: Decimal,
    pub variant_sku: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderAddress {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address_1: Option<String>,
    pub address_2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderShippingMethod {
    pub name: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTransaction {
    pub amount: Decimal,
    pub currency_code: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Stock locations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLocation {
    pub id: String,
    pub name: String,
}
