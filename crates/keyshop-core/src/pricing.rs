//! Storefront pricing.

use serde::{Deserialize, Serialize};

/// Default key price: 100 currency units.
pub const DEFAULT_KEY_PRICE_CENTS: i64 = 10_000;

/// Pricing and catalog configuration for key purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Fixed price of one key, in minor units.
    pub key_price_cents: i64,

    /// Purchasable map names. Empty means any non-empty name is accepted.
    pub maps: Vec<String>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            key_price_cents: DEFAULT_KEY_PRICE_CENTS,
            maps: Vec::new(),
        }
    }
}

impl PricingConfig {
    /// Check whether `map_name` can be purchased.
    #[must_use]
    pub fn is_purchasable(&self, map_name: &str) -> bool {
        let map_name = map_name.trim();
        !map_name.is_empty() && (self.maps.is_empty() || self.maps.iter().any(|m| m == map_name))
    }
}
