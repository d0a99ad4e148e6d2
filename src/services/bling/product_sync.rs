// Product reconciliation
// Diffs canonical Bling snapshots against existing platform products matched
// by external id, builds nested upsert payloads, and submits them as one
// batched call. Per-product skip decisions are warnings; the batched upsert
// itself is all-or-nothing.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::middleware::error_handling::AppError;
use crate::models::bling_config::SyncPreferences;
use crate::models::platform::{Product, ProductUpsert, VariantUpsert};
use crate::models::snapshot::{ProductSnapshot, VariantSnapshot};
use crate::repositories::config_repo::ConfigStore;
use crate::services::bling::client::{BlingApiError, BlingClient};
use crate::services::bling::snapshot::normalize_product_snapshot;
use crate::services::bling::token_manager::{TokenError, TokenManager};
use crate::services::platform::ProductService;

/// How many products the summary previews for the admin UI.
const PREVIEW_LIMIT: usize = 5;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ProductSyncError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Api(#[from] BlingApiError),

    #[error(transparent)]
    Platform(#[from] AppError),
}

impl From<ProductSyncError> for AppError {
    fn from(err: ProductSyncError) -> Self {
        match err {
            ProductSyncError::Token(inner) => inner.into(),
            ProductSyncError::Api(inner) => {
                if let Some(status) = inner.status() {
                    tracing::error!(status = %status, "Bling API failure during product sync");
                }
                AppError::Upstream(inner.to_string())
            }
            ProductSyncError::Platform(inner) => inner,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProductSyncError>;

// ============================================================================
// Result Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ProductSyncSummary {
    pub total_products: usize,
    pub total_variants: usize,
    pub products_with_inventory_data: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub preview: Vec<ProductPreview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPreview {
    pub external_id: String,
    pub name: String,
    pub variants: usize,
    pub stock_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductSyncResult {
    pub summary: ProductSyncSummary,
    pub warnings: Vec<String>,
}

// ============================================================================
// Product Sync Service
// ============================================================================

pub struct ProductSyncService {
    config_store: Arc<dyn ConfigStore>,
    products: Arc<dyn ProductService>,
    token_manager: Arc<TokenManager>,
    bling: Arc<BlingClient>,
}

impl ProductSyncService {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        products: Arc<dyn ProductService>,
        token_manager: Arc<TokenManager>,
        bling: Arc<BlingClient>,
    ) -> Self {
        Self {
            config_store,
            products,
            token_manager,
            bling,
        }
    }

    /// Fetches the current Bling catalog as canonical snapshots. Built fresh
    /// on every call; nothing is cached between syncs.
    pub async fn fetch_snapshots(
        &self,
        preferences: &SyncPreferences,
    ) -> Result<Vec<ProductSnapshot>> {
        let client = self.bling.authorized(&self.token_manager).await?;

        let raw_products = client.fetch_all_products().await?;
        let snapshots: Vec<ProductSnapshot> = raw_products
            .iter()
            .map(|product| normalize_product_snapshot(product, preferences))
            .collect();

        tracing::info!("Fetched {} products from Bling", snapshots.len());
        Ok(snapshots)
    }

    /// Reconciles the Bling catalog into the platform. See module docs for
    /// the warning-vs-failure split.
    pub async fn sync_products(&self) -> Result<ProductSyncResult> {
        let config = self.config_store.load().await?.unwrap_or_default();
        let preferences = config.sync_preferences;

        if !preferences.products.enabled {
            tracing::info!("Product sync skipped: disabled in preferences");
            return Ok(ProductSyncResult {
                summary: build_sync_summary(&[], 0, 0, 0),
                warnings: vec!["Product sync is disabled in preferences.".to_string()],
            });
        }

        let snapshots = self.fetch_snapshots(&preferences).await?;

        if snapshots.is_empty() {
            return Ok(ProductSyncResult {
                summary: build_sync_summary(&[], 0, 0, 0),
                warnings: Vec::new(),
            });
        }

        let external_ids: Vec<String> = snapshots
            .iter()
            .filter(|snapshot| !snapshot.external_id.is_empty())
            .map(|snapshot| snapshot.external_id.clone())
            .collect();

        let existing_products = if external_ids.is_empty() {
            Vec::new()
        } else {
            self.products
                .list_products_by_external_ids(&external_ids)
                .await?
        };

        let existing_by_external_id: HashMap<&str, &Product> = existing_products
            .iter()
            .filter_map(|product| {
                product
                    .external_id
                    .as_deref()
                    .map(|external_id| (external_id, product))
            })
            .collect();

        let mut warnings = Vec::new();
        let mut payloads = Vec::new();
        let mut modes = Vec::new();

        for snapshot in &snapshots {
            if snapshot.external_id.is_empty() {
                warnings.push(format!(
                    "Product \"{}\" skipped: no external id on the Bling side.",
                    snapshot.name
                ));
                continue;
            }

            let existing = existing_by_external_id
                .get(snapshot.external_id.as_str())
                .copied();

            match build_product_upsert(snapshot, existing) {
                Some(upsert) => {
                    modes.push(existing.is_some());
                    payloads.push(upsert);
                }
                None => {
                    warnings.push(format!(
                        "Product \"{}\" skipped: could not build a sync payload.",
                        snapshot.name
                    ));
                }
            }
        }

        if payloads.is_empty() {
            return Ok(ProductSyncResult {
                summary: build_sync_summary(&snapshots, 0, 0, snapshots.len()),
                warnings,
            });
        }

        let skipped = snapshots.len() - payloads.len();
        self.products.upsert_products(payloads).await?;

        let updated = modes.iter().filter(|&&matched| matched).count();
        let created = modes.len() - updated;

        let summary = build_sync_summary(&snapshots, created, updated, skipped);

        tracing::info!(
            "Product sync finished: {created} created, {updated} updated, {} processed",
            summary.total_products
        );
        for warning in &warnings {
            tracing::warn!("{warning}");
        }

        Ok(ProductSyncResult { summary, warnings })
    }
}

// ============================================================================
// Payload construction
// ============================================================================

/// Builds the nested upsert for one snapshot, or `None` when no valid
/// variant can be produced (the reconciler records a warning and moves on).
fn build_product_upsert(
    snapshot: &ProductSnapshot,
    existing: Option<&Product>,
) -> Option<ProductUpsert> {
    // Products without explicit variants still need one sellable unit, so a
    // fallback variant is synthesized from the product-level sku/price.
    let owned_fallback;
    let variant_snapshots: &[VariantSnapshot] = if snapshot.variants.is_empty() {
        owned_fallback = vec![fallback_variant_snapshot(snapshot)];
        &owned_fallback
    } else {
        &snapshot.variants
    };

    let variants: Vec<VariantUpsert> = variant_snapshots
        .iter()
        .map(|variant| build_variant_upsert(snapshot, variant, existing))
        .collect();

    if variants.is_empty() {
        return None;
    }

    let mut metadata = serde_json::Map::new();
    metadata.insert(
        "bling_external_id".to_string(),
        Value::String(snapshot.external_id.clone()),
    );
    metadata.insert("bling_source".to_string(), Value::String("bling".to_string()));

    Some(ProductUpsert {
        id: existing.map(|product| product.id.clone()),
        title: snapshot.name.clone(),
        description: snapshot.description.clone(),
        external_id: snapshot.external_id.clone(),
        status: existing
            .map(|product| product.status.clone())
            .unwrap_or_else(|| "published".to_string()),
        thumbnail: snapshot.images.first().cloned(),
        images: snapshot.images.clone(),
        variants,
        metadata,
    })
}

/// Matches a snapshot variant against the existing product's variants: SKU
/// equality wins, then the Bling external id stored in variant metadata;
/// otherwise the variant is new.
fn build_variant_upsert(
    snapshot: &ProductSnapshot,
    variant: &VariantSnapshot,
    existing: Option<&Product>,
) -> VariantUpsert {
    let existing_variant = existing.and_then(|product| {
        product.variants.iter().find(|candidate| {
            if let (Some(sku), Some(candidate_sku)) = (variant.sku.as_deref(), candidate.sku.as_deref()) {
                return sku == candidate_sku;
            }
            if let Some(external_id) = variant.external_id.as_deref() {
                return candidate
                    .metadata
                    .get("bling_external_id")
                    .and_then(Value::as_str)
                    == Some(external_id);
            }
            false
        })
    });

    let title = variant
        .sku
        .clone()
        .or_else(|| existing_variant.map(|v| v.title.clone()))
        .unwrap_or_else(|| format!("{} - Bling", snapshot.name));

    let mut metadata = existing_variant
        .map(|v| v.metadata.clone())
        .unwrap_or_default();
    if let Some(external_id) = &variant.external_id {
        metadata.insert(
            "bling_external_id".to_string(),
            Value::String(external_id.clone()),
        );
    }

    VariantUpsert {
        id: existing_variant.map(|v| v.id.clone()),
        title,
        sku: variant
            .sku
            .clone()
            .or_else(|| existing_variant.and_then(|v| v.sku.clone())),
        barcode: variant
            .barcode
            .clone()
            .or_else(|| existing_variant.and_then(|v| v.barcode.clone())),
        metadata,
    }
}

fn fallback_variant_snapshot(snapshot: &ProductSnapshot) -> VariantSnapshot {
    VariantSnapshot {
        external_id: Some(snapshot.external_id.clone()),
        sku: snapshot
            .sku
            .clone()
            .or_else(|| Some(snapshot.external_id.clone())),
        barcode: None,
        price: snapshot.price,
        currency: snapshot.currency.clone(),
        weight_kg: None,
        depth_cm: None,
        height_cm: None,
        width_cm: None,
        stock: snapshot.stock.clone(),
    }
}

fn build_sync_summary(
    snapshots: &[ProductSnapshot],
    created: usize,
    updated: usize,
    skipped: usize,
) -> ProductSyncSummary {
    let total_variants = snapshots
        .iter()
        .map(|snapshot| snapshot.variants.len())
        .sum();

    let products_with_inventory_data = snapshots
        .iter()
        .filter(|snapshot| snapshot.has_inventory_data())
        .count();

    let preview = snapshots
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|snapshot| ProductPreview {
            external_id: snapshot.external_id.clone(),
            name: snapshot.name.clone(),
            variants: snapshot.variants.len(),
            stock_entries: snapshot.stock.len(),
        })
        .collect();

    ProductSyncSummary {
        total_products: snapshots.len(),
        total_variants,
        products_with_inventory_data,
        created,
        updated,
        skipped,
        preview,
    }
}
