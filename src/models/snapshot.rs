use serde::Serialize;
use serde_json::{Map, Value};

/// One stock entry as reported by Bling, normalized out of the several wire
/// shapes the API can produce (scalar, object, list).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSnapshot {
    pub warehouse_id: Option<String>,
    pub quantity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantSnapshot {
    pub external_id: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub weight_kg: Option<f64>,
    pub depth_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub stock: Vec<StockSnapshot>,
}

/// Canonical in-memory view of a Bling product for one sync pass. Built
/// fresh on every call and never cached. Optional fields are populated only
/// when the corresponding preference flag allows them; absent means the
/// field was gated off, which downstream code distinguishes from "present
/// but empty".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSnapshot {
    /// Bling-side identifier; empty when the row carried none, which the
    /// reconciler treats as a skip condition.
    pub external_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub images: Vec<String>,
    pub stock: Vec<StockSnapshot>,
    pub variants: Vec<VariantSnapshot>,
    /// The upstream object as received, kept for diagnostics.
    #[serde(skip)]
    pub raw: Map<String, Value>,
}

impl ProductSnapshot {
    pub fn has_inventory_data(&self) -> bool {
        !self.stock.is_empty() || self.variants.iter().any(|variant| !variant.stock.is_empty())
    }
}
