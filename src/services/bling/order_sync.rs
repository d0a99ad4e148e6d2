// Order synchronization
// Maps a platform order onto Bling's sale schema (customer, address, line
// items, installments, shipping), validates the tax document, posts the
// sale, and persists the outcome back onto the order's metadata. Items that
// cannot resolve a Bling reference are dropped with a warning; the sync only
// fails outright when nothing syncable remains.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::middleware::error_handling::AppError;
use crate::models::bling_config::SyncPreferences;
use crate::models::platform::{
    Metadata, Order, OrderAddress, OrderLineItem, OrderTransaction,
};
use crate::repositories::config_repo::ConfigStore;
use crate::services::bling::client::{BlingApiError, BlingClient};
use crate::services::bling::product_sync::ProductSyncService;
use crate::services::bling::token_manager::{TokenError, TokenManager};
use crate::services::platform::OrderService;
use crate::utils::documents::{is_valid_cnpj, is_valid_cpf, sanitize_document};

static HOUSE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum OrderSyncError {
    #[error("Order {0} was not found.")]
    OrderNotFound(String),

    #[error("Order synchronization with Bling is disabled in preferences.")]
    SyncDisabled,

    #[error("Order has no shipping or billing address.")]
    MissingAddress,

    #[error("Street address is required to sync the order.")]
    MissingStreet,

    #[error("A CPF or CNPJ is required to sync the order with Bling.")]
    MissingDocument,

    #[error("{0}")]
    InvalidDocument(String),

    #[error("No order item carries a Bling SKU or external id.")]
    NoSyncableItems,

    #[error("Order already synced to Bling as sale {0}. Re-run with force to send it again.")]
    AlreadySynced(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Api(#[from] BlingApiError),

    #[error(transparent)]
    Platform(#[from] AppError),
}

impl From<OrderSyncError> for AppError {
    fn from(err: OrderSyncError) -> Self {
        match err {
            OrderSyncError::OrderNotFound(_) => AppError::NotFound(err.to_string()),
            OrderSyncError::AlreadySynced(_) => AppError::Conflict(err.to_string()),
            OrderSyncError::SyncDisabled
            | OrderSyncError::MissingAddress
            | OrderSyncError::MissingStreet
            | OrderSyncError::MissingDocument
            | OrderSyncError::InvalidDocument(_)
            | OrderSyncError::NoSyncableItems => AppError::BadRequest(err.to_string()),
            OrderSyncError::Token(inner) => inner.into(),
            OrderSyncError::Api(inner) => {
                if let Some(status) = inner.status() {
                    tracing::error!(status = %status, "Bling API failure during order sync");
                }
                AppError::Upstream(inner.to_string())
            }
            OrderSyncError::Platform(inner) => inner,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderSyncError>;

// ============================================================================
// Request/Result Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OrderSyncOptions {
    #[serde(default)]
    pub generate_nfe: bool,
    #[serde(default)]
    pub generate_shipping_label: bool,
    /// Send again even when a prior sale id is already recorded.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSyncSummary {
    pub total_items: usize,
    pub total_amount: f64,
    pub freight_amount: f64,
    pub bling_sale_id: Option<String>,
    pub synced_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSyncResult {
    pub summary: OrderSyncSummary,
    pub payload: Value,
    pub response: Value,
    pub warnings: Vec<String>,
}

// ============================================================================
// Order Sync Service
// ============================================================================

pub struct OrderSyncService {
    config_store: Arc<dyn ConfigStore>,
    orders: Arc<dyn OrderService>,
    token_manager: Arc<TokenManager>,
    bling: Arc<BlingClient>,
    product_sync: Arc<ProductSyncService>,
}

impl OrderSyncService {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        orders: Arc<dyn OrderService>,
        token_manager: Arc<TokenManager>,
        bling: Arc<BlingClient>,
        product_sync: Arc<ProductSyncService>,
    ) -> Self {
        Self {
            config_store,
            orders,
            token_manager,
            bling,
            product_sync,
        }
    }

    pub async fn sync_order(
        &self,
        order_id: &str,
        options: OrderSyncOptions,
    ) -> Result<OrderSyncResult> {
        let order = self
            .orders
            .retrieve_order(order_id)
            .await?
            .ok_or_else(|| OrderSyncError::OrderNotFound(order_id.to_string()))?;

        let config = self.config_store.load().await?.unwrap_or_default();
        let preferences = config.sync_preferences;

        if !preferences.orders.enabled || !preferences.orders.send_to_bling {
            return Err(OrderSyncError::SyncDisabled);
        }

        if !options.force {
            if let Some(sale_id) = existing_sale_id(&order.metadata) {
                return Err(OrderSyncError::AlreadySynced(sale_id));
            }
        }

        let mut warnings = Vec::new();

        let address = order
            .shipping_address
            .as_ref()
            .or(order.billing_address.as_ref())
            .ok_or(OrderSyncError::MissingAddress)?;

        let document = extract_document(&order, address).ok_or(OrderSyncError::MissingDocument)?;
        let document_digits = sanitize_document(&document);
        let is_cpf = document_digits.len() == 11;
        if is_cpf && !is_valid_cpf(&document_digits) {
            return Err(OrderSyncError::InvalidDocument(
                "The provided CPF is invalid.".to_string(),
            ));
        }
        if !is_cpf && !is_valid_cnpj(&document_digits) {
            return Err(OrderSyncError::InvalidDocument(
                "The provided CNPJ is invalid.".to_string(),
            ));
        }

        let items_payload = build_items_payload(&order.items, &mut warnings);
        if items_payload.is_empty() {
            return Err(OrderSyncError::NoSyncableItems);
        }

        let total_items = items_payload.len();
        let payload = build_sale_payload(
            &order,
            address,
            &document_digits,
            is_cpf,
            items_payload,
            &preferences,
            options,
        )?;

        let client = self.bling.authorized(&self.token_manager).await?;
        let response = client.create_sale(&payload).await?;

        let sale_id = extract_sale_id(&response);

        self.persist_sync_outcome(&order, sale_id.as_deref(), &payload, &response, &warnings)
            .await?;

        let summary = OrderSyncSummary {
            total_items,
            total_amount: payload
                .get("total")
                .and_then(Value::as_f64)
                .unwrap_or_else(|| decimal_to_f64(order.total)),
            freight_amount: payload
                .get("vlr_frete")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            bling_sale_id: sale_id.clone(),
            synced_at: Utc::now(),
        };

        // Secondary step: refresh platform stock when bidirectional inventory
        // sync is on. Its failure must not fail the order sync.
        if preferences.inventory.enabled && preferences.inventory.bidirectional {
            if let Err(err) = self.product_sync.sync_products().await {
                warnings.push(format!(
                    "Failed to refresh platform stock after sending the order: {}",
                    AppError::from(err)
                ));
            }
        }

        match &sale_id {
            Some(id) => tracing::info!("Order {} synced to Bling as sale {id}", order.id),
            None => tracing::info!("Order {} synced to Bling", order.id),
        }

        Ok(OrderSyncResult {
            summary,
            payload,
            response,
            warnings,
        })
    }

    /// Writes the outcome under the order's `bling` metadata namespace,
    /// merging with whatever is already there.
    async fn persist_sync_outcome(
        &self,
        order: &Order,
        sale_id: Option<&str>,
        payload: &Value,
        response: &Value,
        warnings: &[String],
    ) -> Result<()> {
        let mut metadata = order.metadata.clone();

        let mut bling = metadata
            .get("bling")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        bling.insert(
            "sale_id".to_string(),
            sale_id.map(|id| Value::String(id.to_string())).unwrap_or(Value::Null),
        );
        bling.insert(
            "last_sync_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        bling.insert("last_payload".to_string(), payload.clone());
        bling.insert("last_response".to_string(), response.clone());
        bling.insert(
            "warnings".to_string(),
            Value::Array(warnings.iter().map(|w| Value::String(w.clone())).collect()),
        );

        metadata.insert("bling".to_string(), Value::Object(bling));

        self.orders
            .update_order_metadata(&order.id, metadata)
            .await?;

        Ok(())
    }
}

// ============================================================================
// Payload construction
// ============================================================================

fn build_sale_payload(
    order: &Order,
    address: &OrderAddress,
    document: &str,
    is_cpf: bool,
    items_payload: Vec<Value>,
    preferences: &SyncPreferences,
    options: OrderSyncOptions,
) -> Result<Value> {
    let street = address
        .address_1
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(OrderSyncError::MissingStreet)?;

    let address_meta = &address.metadata;
    let billing = order.billing_address.as_ref();

    let customer_name = compose_customer_name(order);
    let phone = pick_string([
        address.phone.as_deref(),
        billing.and_then(|b| b.phone.as_deref()),
        meta_str(&order.metadata, "telefone"),
        meta_str(&order.metadata, "phone"),
    ]);
    let district = pick_string([
        meta_str(address_meta, "bairro"),
        meta_str(address_meta, "district"),
        address.province.as_deref(),
    ])
    .unwrap_or_else(|| "Centro".to_string());
    let house_number = extract_house_number(address).unwrap_or_else(|| "S/N".to_string());
    let uf = pick_string([
        meta_str(address_meta, "uf"),
        address.province.as_deref(),
        address.country_code.as_deref(),
    ])
    .unwrap_or_else(|| "SP".to_string());
    let postal_code = address
        .postal_code
        .as_deref()
        .map(sanitize_document)
        .filter(|cep| !cep.is_empty());

    let total_amount = decimal_to_f64(order.total);
    let discount_total = decimal_to_f64(order.discount_total);

    let mut cliente = Map::new();
    cliente.insert("nome".to_string(), Value::String(customer_name.clone()));
    cliente.insert(
        "tipoPessoa".to_string(),
        Value::String(if is_cpf { "F" } else { "J" }.to_string()),
    );
    cliente.insert("cpf_cnpj".to_string(), Value::String(document.to_string()));
    insert_opt_str(
        &mut cliente,
        "email",
        order
            .email
            .clone()
            .or_else(|| pick_string([meta_str(&order.metadata, "email")])),
    );
    insert_opt_str(
        &mut cliente,
        "fone",
        phone.map(|value| sanitize_document(&value)),
    );
    cliente.insert("endereco".to_string(), Value::String(street.to_string()));
    cliente.insert("numero".to_string(), Value::String(house_number));
    insert_opt_str(
        &mut cliente,
        "complemento",
        pick_string([
            meta_str(address_meta, "complemento"),
            address.address_2.as_deref(),
        ]),
    );
    cliente.insert("bairro".to_string(), Value::String(district));
    insert_opt_str(&mut cliente, "cep", postal_code);
    insert_opt_str(&mut cliente, "cidade", address.city.clone());
    cliente.insert("uf".to_string(), Value::String(uf));
    cliente.insert(
        "ie_rg".to_string(),
        Value::String(
            pick_string([meta_str(address_meta, "state_registration")])
                .unwrap_or_else(|| "ISENTO".to_string()),
        ),
    );

    let shipping_method = order.shipping_methods.first();
    let freight = {
        let from_order = decimal_to_f64(order.shipping_total);
        if from_order > 0.0 {
            from_order
        } else {
            shipping_method
                .map(|method| decimal_to_f64(method.amount))
                .unwrap_or(0.0)
        }
    };
    let shipping_meta = shipping_method.map(|method| &method.metadata);

    let mut payload = Map::new();
    payload.insert(
        "numeroPedidoLoja".to_string(),
        Value::String(order.id.clone()),
    );
    if let Some(display_id) = order.display_id {
        payload.insert("numero".to_string(), Value::from(display_id));
    }
    payload.insert("situacao".to_string(), Value::String("Atendido".to_string()));
    payload.insert(
        "data".to_string(),
        Value::String(order.created_at.format("%Y-%m-%d").to_string()),
    );
    payload.insert("cliente".to_string(), Value::Object(cliente.clone()));
    payload.insert("itens".to_string(), Value::Array(items_payload));
    if freight > 0.0 {
        payload.insert("vlr_frete".to_string(), Value::from(freight));
    }
    if discount_total > 0.0 {
        payload.insert("vlr_desconto".to_string(), Value::from(discount_total));
    }
    payload.insert(
        "parcelas".to_string(),
        Value::Array(build_installments(&order.transactions)),
    );
    insert_opt_str(
        &mut payload,
        "observacoes",
        pick_string([meta_str(&order.metadata, "observacoes")]),
    );
    insert_opt_str(
        &mut payload,
        "observacoesInternas",
        pick_string([meta_str(&order.metadata, "observacoes_internas")]),
    );
    payload.insert("total".to_string(), Value::from(total_amount));
    insert_opt_str(
        &mut payload,
        "natureza_operacao",
        pick_string([meta_str(&order.metadata, "natureza_operacao")]),
    );

    if preferences.orders.generate_nf || options.generate_nfe {
        payload.insert("gerar_nfe".to_string(), Value::String("S".to_string()));
    }
    if options.generate_shipping_label {
        payload.insert("gerar_etiqueta".to_string(), Value::String("S".to_string()));
    }

    let mut label_address = Map::new();
    for key in ["nome", "endereco", "numero", "complemento", "cep", "bairro"] {
        if let Some(value) = cliente.get(key) {
            label_address.insert(key.to_string(), value.clone());
        }
    }
    if let Some(city) = cliente.get("cidade") {
        label_address.insert("municipio".to_string(), city.clone());
    }
    if let Some(uf) = cliente.get("uf") {
        label_address.insert("uf".to_string(), uf.clone());
    }

    let mut transporte = Map::new();
    insert_opt_str(
        &mut transporte,
        "transportadora",
        shipping_method.and_then(|method| method.name.clone()),
    );
    insert_opt_str(
        &mut transporte,
        "servico_correios",
        shipping_meta.and_then(|meta| pick_string([meta_str(meta, "service_code")])),
    );
    insert_opt_str(
        &mut transporte,
        "tipo_frete",
        shipping_meta.and_then(|meta| pick_string([meta_str(meta, "shipping_type")])),
    );
    transporte.insert("dados_etiqueta".to_string(), Value::Object(label_address));
    payload.insert("transporte".to_string(), Value::Object(transporte));

    Ok(Value::Object(payload))
}

/// Maps order items onto Bling's `itens` entries. Items without a resolvable
/// Bling reference are dropped with a warning, never aborted here.
fn build_items_payload(items: &[OrderLineItem], warnings: &mut Vec<String>) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| map_item_payload(item, warnings))
        .collect()
}

fn map_item_payload(item: &OrderLineItem, warnings: &mut Vec<String>) -> Option<Value> {
    let external_ref = pick_string([
        meta_str(&item.metadata, "bling_external_id"),
        meta_str(&item.metadata, "external_id"),
        meta_str(&item.metadata, "codigo"),
        meta_str(&item.metadata, "sku"),
        item.variant_sku.as_deref(),
    ]);

    let Some(codigo) = external_ref else {
        warnings.push(format!(
            "Item \"{}\" (id {}) skipped: no Bling SKU or external id reference found.",
            item.title, item.id
        ));
        return None;
    };

    let mut entry = Map::new();
    entry.insert("codigo".to_string(), Value::String(codigo));
    entry.insert("descricao".to_string(), Value::String(item.title.clone()));
    entry.insert("quantidade".to_string(), Value::from(item.quantity));
    entry.insert(
        "valor".to_string(),
        Value::from(decimal_to_f64(item.unit_price)),
    );

    let discount = decimal_to_f64(item.discount_total);
    if discount > 0.0 {
        entry.insert("desconto".to_string(), Value::from(discount));
    }

    Some(Value::Object(entry))
}

fn build_installments(transactions: &[OrderTransaction]) -> Vec<Value> {
    transactions
        .iter()
        .map(|transaction| {
            let date = transaction.created_at.unwrap_or_else(Utc::now);
            let mut entry = Map::new();
            entry.insert(
                "data".to_string(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
            entry.insert(
                "vlr".to_string(),
                Value::from(decimal_to_f64(transaction.amount)),
            );
            insert_opt_str(&mut entry, "obs", transaction.currency_code.clone());
            Value::Object(entry)
        })
        .collect()
}

/// Document resolution order: resolved address metadata, billing address
/// metadata, then order metadata; `document`/`cpf`/`cnpj` keys in each.
fn extract_document(order: &Order, address: &OrderAddress) -> Option<String> {
    let billing_meta = order.billing_address.as_ref().map(|b| &b.metadata);

    let mut candidates: Vec<Option<&str>> = vec![
        meta_str(&address.metadata, "document"),
        meta_str(&address.metadata, "cpf"),
        meta_str(&address.metadata, "cnpj"),
    ];
    if let Some(meta) = billing_meta {
        candidates.extend([
            meta_str(meta, "document"),
            meta_str(meta, "cpf"),
            meta_str(meta, "cnpj"),
        ]);
    }
    candidates.extend([
        meta_str(&order.metadata, "document"),
        meta_str(&order.metadata, "cpf"),
        meta_str(&order.metadata, "cnpj"),
    ]);

    pick_string(candidates)
}

/// House number from address metadata, the complement line, or the first
/// digit run in the street line.
fn extract_house_number(address: &OrderAddress) -> Option<String> {
    if let Some(explicit) = pick_string([
        meta_str(&address.metadata, "number"),
        meta_str(&address.metadata, "numero"),
        address.address_2.as_deref(),
    ]) {
        return Some(explicit);
    }

    address
        .address_1
        .as_deref()
        .and_then(|street| HOUSE_NUMBER_RE.find(street))
        .map(|m| m.as_str().to_string())
}

/// Shipping name, then billing name, then email, then the literal fallback.
fn compose_customer_name(order: &Order) -> String {
    for candidate in [&order.shipping_address, &order.billing_address] {
        if let Some(address) = candidate {
            if let Some(first) = address
                .first_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
            {
                let last = address.last_name.as_deref().unwrap_or("");
                return format!("{first} {last}").trim().to_string();
            }
        }
    }

    order
        .email
        .clone()
        .unwrap_or_else(|| "Cliente".to_string())
}

/// Sale id from `data.id`, then `data.numero`; falls back to the response
/// root when no `data` envelope is present.
fn extract_sale_id(response: &Value) -> Option<String> {
    let data = response
        .get("data")
        .filter(|value| value.is_object())
        .unwrap_or(response);

    value_to_id(data.get("id")).or_else(|| value_to_id(data.get("numero")))
}

fn existing_sale_id(metadata: &Metadata) -> Option<String> {
    metadata
        .get("bling")
        .and_then(Value::as_object)
        .and_then(|bling| value_to_id(bling.get("sale_id")))
}

fn value_to_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn meta_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}

fn pick_string<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn insert_opt_str(map: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value));
    }
}
