use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key of the singleton configuration row.
pub const BLING_CONFIG_ID: &str = "bling_config";

/// Safety margin subtracted from `expires_in` when deciding whether the
/// stored access token is still usable.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 300;

// ============================================================================
// Sync Preferences
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPreferences {
    pub enabled: bool,
    pub import_images: bool,
    pub import_descriptions: bool,
    pub import_prices: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryPreferences {
    pub enabled: bool,
    pub bidirectional: bool,
    pub locations: Vec<InventoryLocationMapping>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPreferences {
    pub enabled: bool,
    pub send_to_bling: bool,
    pub receive_from_bling: bool,
    pub generate_nf: bool,
}

/// Maps a platform stock location onto a Bling deposit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLocationMapping {
    pub stock_location_id: String,
    pub bling_deposit_id: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPreferences {
    pub products: ProductPreferences,
    pub inventory: InventoryPreferences,
    pub orders: OrderPreferences,
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self {
            products: ProductPreferences {
                enabled: true,
                import_images: true,
                import_descriptions: true,
                import_prices: true,
            },
            inventory: InventoryPreferences {
                enabled: true,
                bidirectional: false,
                locations: Vec::new(),
            },
            orders: OrderPreferences {
                enabled: true,
                send_to_bling: true,
                receive_from_bling: true,
                generate_nf: false,
            },
        }
    }
}

// Partial-update shapes accepted by POST /admin/bling/config. Every field is
// optional; omitted fields fall back to the currently stored value (or the
// hardcoded default when nothing is stored yet).

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProductPreferencesUpdate {
    pub enabled: Option<bool>,
    pub import_images: Option<bool>,
    pub import_descriptions: Option<bool>,
    pub import_prices: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InventoryPreferencesUpdate {
    pub enabled: Option<bool>,
    pub bidirectional: Option<bool>,
    /// When present, wholly replaces the stored mapping list.
    pub locations: Option<Vec<InventoryLocationMapping>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrderPreferencesUpdate {
    pub enabled: Option<bool>,
    pub send_to_bling: Option<bool>,
    pub receive_from_bling: Option<bool>,
    pub generate_nf: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncPreferencesUpdate {
    pub products: Option<ProductPreferencesUpdate>,
    pub inventory: Option<InventoryPreferencesUpdate>,
    pub orders: Option<OrderPreferencesUpdate>,
}

impl SyncPreferences {
    /// Resolves effective preferences from a partial update layered over the
    /// stored set. Pure and deterministic: `merge(merge(a, c), c')` with the
    /// result as the new current is idempotent. Location lists are replaced
    /// wholesale when the update carries one, otherwise the current entries
    /// are kept.
    pub fn merge(incoming: &SyncPreferencesUpdate, current: Option<&SyncPreferences>) -> Self {
        let defaults = SyncPreferences::default();
        let source = current.unwrap_or(&defaults);

        let products = incoming.products.clone().unwrap_or_default();
        let inventory = incoming.inventory.clone().unwrap_or_default();
        let orders = incoming.orders.clone().unwrap_or_default();

        Self {
            products: ProductPreferences {
                enabled: products.enabled.unwrap_or(source.products.enabled),
                import_images: products
                    .import_images
                    .unwrap_or(source.products.import_images),
                import_descriptions: products
                    .import_descriptions
                    .unwrap_or(source.products.import_descriptions),
                import_prices: products
                    .import_prices
                    .unwrap_or(source.products.import_prices),
            },
            inventory: InventoryPreferences {
                enabled: inventory.enabled.unwrap_or(source.inventory.enabled),
                bidirectional: inventory
                    .bidirectional
                    .unwrap_or(source.inventory.bidirectional),
                locations: match inventory.locations {
                    Some(locations) => normalize_location_defaults(locations),
                    None => source.inventory.locations.clone(),
                },
            },
            orders: OrderPreferences {
                enabled: orders.enabled.unwrap_or(source.orders.enabled),
                send_to_bling: orders.send_to_bling.unwrap_or(source.orders.send_to_bling),
                receive_from_bling: orders
                    .receive_from_bling
                    .unwrap_or(source.orders.receive_from_bling),
                generate_nf: orders.generate_nf.unwrap_or(source.orders.generate_nf),
            },
        }
    }

    /// The mapping whose deposit receives stock movements when an entry does
    /// not name one explicitly.
    pub fn default_location(&self) -> Option<&InventoryLocationMapping> {
        self.inventory
            .locations
            .iter()
            .find(|location| location.is_default)
    }
}

/// Enforces the at-most-one-default invariant on a replacement mapping list.
/// The first flagged entry wins; when none is flagged and the list is
/// non-empty, the first entry is promoted.
fn normalize_location_defaults(
    mut locations: Vec<InventoryLocationMapping>,
) -> Vec<InventoryLocationMapping> {
    let mut seen_default = false;
    for location in locations.iter_mut() {
        if location.is_default {
            if seen_default {
                location.is_default = false;
            }
            seen_default = true;
        }
    }

    if !seen_default {
        if let Some(first) = locations.first_mut() {
            first.is_default = true;
        }
    }

    locations
}

// ============================================================================
// Configuration Row
// ============================================================================

/// The singleton Bling configuration, with credentials already decrypted and
/// preferences already merged over defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct BlingConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub token_updated_at: Option<DateTime<Utc>>,
    pub sync_preferences: SyncPreferences,
    /// Optimistic-lock counter bumped on every token write.
    pub version: i32,
}

impl Default for BlingConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            webhook_secret: None,
            access_token: None,
            refresh_token: None,
            expires_in: None,
            token_updated_at: None,
            sync_preferences: SyncPreferences::default(),
            version: 0,
        }
    }
}

/// Credential + preference update as accepted by the config endpoint. The
/// three credential fields are always applied: an absent or empty value
/// clears the stored one. Preferences merge only when provided.
#[derive(Debug, Clone, Default)]
pub struct BlingConfigUpdate {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub sync_preferences: Option<SyncPreferencesUpdate>,
}

/// Token triple persisted after an authorization-code exchange or refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_updated_at: DateTime<Utc>,
}

impl BlingConfig {
    pub fn apply_update(&mut self, update: BlingConfigUpdate) {
        self.client_id = sanitize_credential(update.client_id.as_deref());
        self.client_secret = sanitize_credential(update.client_secret.as_deref());
        self.webhook_secret = sanitize_credential(update.webhook_secret.as_deref());

        if let Some(preferences) = update.sync_preferences {
            self.sync_preferences =
                SyncPreferences::merge(&preferences, Some(&self.sync_preferences));
        }
    }

    pub fn apply_tokens(&mut self, tokens: TokenSet) {
        self.access_token = Some(tokens.access_token);
        self.refresh_token = Some(tokens.refresh_token);
        self.expires_in = Some(tokens.expires_in);
        self.token_updated_at = Some(tokens.token_updated_at);
        self.version += 1;
    }

    /// Whether the stored access token is still inside the expiry window
    /// (`token_updated_at + expires_in - 300s`).
    pub fn token_is_fresh(&self, now: DateTime<Utc>) -> bool {
        match (self.access_token.as_ref(), self.token_updated_at, self.expires_in) {
            (Some(_), Some(updated_at), Some(expires_in)) => {
                let expiry =
                    updated_at + chrono::Duration::seconds(expires_in - TOKEN_EXPIRY_MARGIN_SECS);
                now < expiry
            }
            _ => false,
        }
    }
}

/// Trims a credential value and coerces empty strings to `None`.
pub fn sanitize_credential(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(stock: &str, deposit: &str, is_default: bool) -> InventoryLocationMapping {
        InventoryLocationMapping {
            stock_location_id: stock.to_string(),
            bling_deposit_id: deposit.to_string(),
            is_default,
        }
    }

    #[test]
    fn merge_with_no_input_yields_defaults() {
        let merged = SyncPreferences::merge(&SyncPreferencesUpdate::default(), None);
        assert!(merged.products.enabled);
        assert!(merged.products.import_images);
        assert!(merged.inventory.enabled);
        assert!(!merged.inventory.bidirectional);
        assert!(merged.orders.send_to_bling);
        assert!(!merged.orders.generate_nf);
        assert!(merged.inventory.locations.is_empty());
    }

    #[test]
    fn merge_overrides_only_provided_fields() {
        let update = SyncPreferencesUpdate {
            products: Some(ProductPreferencesUpdate {
                import_images: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = SyncPreferences::merge(&update, None);
        assert!(!merged.products.import_images);
        assert!(merged.products.enabled);
        assert!(merged.products.import_prices);
    }

    #[test]
    fn merge_is_idempotent() {
        let current = SyncPreferences::merge(&SyncPreferencesUpdate::default(), None);
        let update = SyncPreferencesUpdate {
            orders: Some(OrderPreferencesUpdate {
                generate_nf: Some(true),
                ..Default::default()
            }),
            inventory: Some(InventoryPreferencesUpdate {
                locations: Some(vec![mapping("loc_1", "77", false)]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let once = SyncPreferences::merge(&update, Some(&current));
        let twice = SyncPreferences::merge(&update, Some(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_replaces_locations_when_provided() {
        let current = SyncPreferences {
            inventory: InventoryPreferences {
                enabled: true,
                bidirectional: false,
                locations: vec![mapping("loc_old", "1", true)],
            },
            ..SyncPreferences::default()
        };

        let update = SyncPreferencesUpdate {
            inventory: Some(InventoryPreferencesUpdate {
                locations: Some(vec![
                    mapping("loc_a", "10", false),
                    mapping("loc_b", "20", false),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = SyncPreferences::merge(&update, Some(&current));
        assert_eq!(merged.inventory.locations.len(), 2);
        assert_eq!(merged.inventory.locations[0].stock_location_id, "loc_a");
    }

    #[test]
    fn merge_keeps_current_locations_when_absent() {
        let current = SyncPreferences {
            inventory: InventoryPreferences {
                enabled: true,
                bidirectional: false,
                locations: vec![mapping("loc_keep", "5", true)],
            },
            ..SyncPreferences::default()
        };

        let merged = SyncPreferences::merge(&SyncPreferencesUpdate::default(), Some(&current));
        assert_eq!(merged.inventory.locations, current.inventory.locations);
    }

    #[test]
    fn replacement_promotes_first_entry_to_default() {
        let locations = normalize_location_defaults(vec![
            mapping("loc_a", "10", false),
            mapping("loc_b", "20", false),
        ]);
        assert!(locations[0].is_default);
        assert!(!locations[1].is_default);
    }

    #[test]
    fn replacement_keeps_at_most_one_default() {
        let locations = normalize_location_defaults(vec![
            mapping("loc_a", "10", true),
            mapping("loc_b", "20", true),
            mapping("loc_c", "30", true),
        ]);
        let defaults: Vec<_> = locations.iter().filter(|l| l.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].stock_location_id, "loc_a");
    }

    #[test]
    fn apply_update_coerces_empty_credentials_to_none() {
        let mut config = BlingConfig::default();
        config.apply_update(BlingConfigUpdate {
            client_id: Some("".to_string()),
            client_secret: Some("secret-x".to_string()),
            webhook_secret: Some("   ".to_string()),
            sync_preferences: None,
        });

        assert_eq!(config.client_id, None);
        assert_eq!(config.client_secret.as_deref(), Some("secret-x"));
        assert_eq!(config.webhook_secret, None);
    }

    #[test]
    fn apply_update_trims_credentials() {
        let mut config = BlingConfig::default();
        config.apply_update(BlingConfigUpdate {
            client_id: Some("  abc123  ".to_string()),
            ..Default::default()
        });
        assert_eq!(config.client_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn token_freshness_uses_safety_margin() {
        let now = Utc::now();
        let mut config = BlingConfig {
            access_token: Some("tok".to_string()),
            token_updated_at: Some(now),
            expires_in: Some(3600),
            ..BlingConfig::default()
        };
        assert!(config.token_is_fresh(now));

        // 3600s lifetime minus the 300s margin: stale at 3300s and beyond.
        config.token_updated_at = Some(now - chrono::Duration::seconds(3301));
        assert!(!config.token_is_fresh(now));

        config.token_updated_at = Some(now - chrono::Duration::seconds(3200));
        assert!(config.token_is_fresh(now));
    }

    #[test]
    fn token_freshness_requires_full_triple() {
        let config = BlingConfig {
            access_token: Some("tok".to_string()),
            ..BlingConfig::default()
        };
        assert!(!config.token_is_fresh(Utc::now()));
    }
}
