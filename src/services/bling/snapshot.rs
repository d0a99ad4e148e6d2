// Bling product snapshot normalization
// Converts the heterogeneous product/variant/stock JSON shapes the Bling API
// produces into canonical snapshots. Unrecognized shapes degrade to empty
// values instead of erroring; field names follow the Bling v3 wire contract
// and must not be renamed.

use serde_json::{Map, Value};

use crate::models::bling_config::SyncPreferences;
use crate::models::snapshot::{ProductSnapshot, StockSnapshot, VariantSnapshot};

/// Normalizes one raw catalog entry. Optional fields (`description`,
/// `price`/`currency`, `images`, stock) are populated only when the matching
/// preference flag allows them.
pub fn normalize_product_snapshot(source: &Value, preferences: &SyncPreferences) -> ProductSnapshot {
    let wrapper = as_object(Some(source));
    // Some endpoints wrap each row in a `produto` envelope.
    let product = wrapper
        .get("produto")
        .filter(|value| value.is_object())
        .map(|value| as_object(Some(value)))
        .unwrap_or(wrapper);

    let external_id = to_optional_string(product.get("id"))
        .or_else(|| to_optional_string(product.get("codigo")))
        .or_else(|| to_optional_string(product.get("sku")))
        .or_else(|| to_optional_string(product.get("idProduto")))
        .unwrap_or_default();

    let include_description = preferences.products.import_descriptions;
    let include_price = preferences.products.import_prices;
    let include_images = preferences.products.import_images;
    let include_inventory = preferences.inventory.enabled;

    let images = if include_images {
        extract_image_urls(&product)
    } else {
        Vec::new()
    };

    let stock = if include_inventory {
        extract_stock_snapshots(&product)
    } else {
        Vec::new()
    };

    let variants = extract_variant_snapshots(&product, preferences, include_inventory);

    let name = to_optional_string(product.get("nome"))
        .or_else(|| to_optional_string(product.get("descricao")))
        .unwrap_or_else(|| "Produto sem nome".to_string());

    let description = if include_description {
        to_optional_string(product.get("descricao"))
    } else {
        None
    };

    let (price, currency) = if include_price {
        (
            parse_number(product.get("preco")),
            to_optional_string(product.get("moeda")).or_else(|| Some("BRL".to_string())),
        )
    } else {
        (None, None)
    };

    let sku = to_optional_string(product.get("codigo"))
        .or_else(|| to_optional_string(product.get("sku")))
        .or_else(|| to_optional_string(product.get("referencia")));

    ProductSnapshot {
        external_id,
        name,
        description,
        price,
        currency,
        sku,
        images,
        stock,
        variants,
        raw: product,
    }
}

fn extract_variant_snapshots(
    product: &Map<String, Value>,
    preferences: &SyncPreferences,
    include_inventory: bool,
) -> Vec<VariantSnapshot> {
    // Both field names occur in the wild, depending on the API vintage.
    let raw_variants = to_value_list(first_present(&[
        product.get("variacoes"),
        product.get("variantes"),
    ]));

    raw_variants
        .iter()
        .map(|entry| {
            let root = as_object(Some(entry));
            let variant = root
                .get("variacao")
                .filter(|value| value.is_object())
                .map(|value| as_object(Some(value)))
                .unwrap_or(root);

            let stock = if include_inventory {
                extract_stock_snapshots(&variant)
            } else {
                Vec::new()
            };

            let (price, currency) = if preferences.products.import_prices {
                (
                    parse_number(first_present(&[
                        variant.get("preco"),
                        variant.get("precoVenda"),
                    ])),
                    to_optional_string(variant.get("moeda")).or_else(|| Some("BRL".to_string())),
                )
            } else {
                (None, None)
            };

            VariantSnapshot {
                external_id: to_optional_string(variant.get("id")),
                sku: to_optional_string(variant.get("sku"))
                    .or_else(|| to_optional_string(variant.get("codigo"))),
                barcode: to_optional_string(variant.get("gtin"))
                    .or_else(|| to_optional_string(variant.get("ean"))),
                price,
                currency,
                weight_kg: parse_number(first_present(&[
                    variant.get("pesoLiquido"),
                    variant.get("pesoBruto"),
                ])),
                depth_cm: parse_number(variant.get("comprimento")),
                height_cm: parse_number(variant.get("altura")),
                width_cm: parse_number(variant.get("largura")),
                stock,
            }
        })
        .collect()
}

fn extract_image_urls(product: &Map<String, Value>) -> Vec<String> {
    let images_raw = first_present(&[product.get("imagens"), product.get("imagem")]);

    match images_raw {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(url) => Some(url.clone()),
                Value::Object(image) => to_optional_string(image.get("link"))
                    .or_else(|| to_optional_string(image.get("url")))
                    .or_else(|| to_optional_string(image.get("path"))),
                _ => None,
            })
            .collect(),
        Some(Value::String(url)) => vec![url.clone()],
        Some(Value::Object(image)) => to_optional_string(image.get("link"))
            .or_else(|| to_optional_string(image.get("url")))
            .map(|url| vec![url])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Stock entries arrive under three key names and in scalar, object, or
/// list form. Everything unrecognized collapses to an empty list.
fn extract_stock_snapshots(data: &Map<String, Value>) -> Vec<StockSnapshot> {
    let raw = first_present(&[
        data.get("estoques"),
        data.get("depositos"),
        data.get("saldo"),
    ]);

    match raw {
        Some(Value::Array(entries)) => entries.iter().filter_map(normalize_stock_entry).collect(),
        Some(value) => normalize_stock_entry(value).into_iter().collect(),
        None => Vec::new(),
    }
}

fn normalize_stock_entry(value: &Value) -> Option<StockSnapshot> {
    match value {
        Value::Null | Value::Array(_) | Value::Bool(_) => None,
        Value::Number(_) | Value::String(_) => Some(StockSnapshot {
            warehouse_id: None,
            quantity: parse_number(Some(value)),
        }),
        Value::Object(entry) => {
            let warehouse_id = to_optional_string(entry.get("idDeposito"))
                .or_else(|| to_optional_string(entry.get("id_deposito")))
                .or_else(|| to_optional_string(entry.get("deposito_id")))
                .or_else(|| {
                    entry
                        .get("deposito")
                        .and_then(Value::as_object)
                        .and_then(|deposito| to_optional_string(deposito.get("id")))
                });

            let quantity = parse_number(entry.get("saldo"))
                .or_else(|| parse_number(entry.get("quantidade")))
                .or_else(|| parse_number(entry.get("estoque")))
                .or_else(|| parse_number(entry.get("disponivel")))
                .or_else(|| parse_number(entry.get("saldoAtual")))
                .or_else(|| parse_number(entry.get("saldoVirtual")));

            if warehouse_id.is_none() && quantity.is_none() {
                return None;
            }

            Some(StockSnapshot {
                warehouse_id,
                quantity,
            })
        }
    }
}

/// Accepts numbers directly and Brazilian-locale numeric strings (`.` as
/// thousands separator, `,` as decimal separator). Invalid input is `None`,
/// never an error.
pub(crate) fn parse_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let normalized = text.replace('.', "").replace(',', ".");
            normalized.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Strings pass through (empty treated as absent), numbers are stringified.
pub(crate) fn to_optional_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// First candidate that is present and not an explicit `null`.
fn first_present<'a>(candidates: &[Option<&'a Value>]) -> Option<&'a Value> {
    candidates
        .iter()
        .copied()
        .flatten()
        .find(|value| !value.is_null())
}

fn as_object(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Lists pass through; null/absent become empty; a lone value becomes a
/// one-element list.
fn to_value_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(entries)) => entries.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}
