use chrono::Duration;
use serde::Deserialize;
use souk_catalog::PricingRules;

/// Tunable marketplace rules, loaded from the `business_rules` config section.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BusinessRules {
    #[serde(default = "default_surcharge")]
    pub delivery_surcharge_cents: i64,
    #[serde(default = "default_claim_window")]
    pub claim_window_seconds: i64,
    #[serde(default = "default_throttle_lines")]
    pub throttle_max_open_lines: i64,
    #[serde(default = "default_throttle_days")]
    pub throttle_window_days: i64,
    #[serde(default = "default_cart_items")]
    pub max_unordered_cart_items: usize,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_surcharge() -> i64 { 2000 }
fn default_claim_window() -> i64 { 2 * 60 * 60 }
fn default_throttle_lines() -> i64 { 10 }
fn default_throttle_days() -> i64 { 30 }
fn default_cart_items() -> usize { 10 }
fn default_sweep_interval() -> u64 { 180 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            delivery_surcharge_cents: default_surcharge(),
            claim_window_seconds: default_claim_window(),
            throttle_max_open_lines: default_throttle_lines(),
            throttle_window_days: default_throttle_days(),
            max_unordered_cart_items: default_cart_items(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl BusinessRules {
    pub fn pricing(&self) -> PricingRules {
        PricingRules {
            delivery_surcharge_cents: self.delivery_surcharge_cents,
        }
    }

    /// Absolute pickup deadline measured from claim creation.
    pub fn claim_window(&self) -> Duration {
        Duration::seconds(self.claim_window_seconds)
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::days(self.throttle_window_days)
    }
}
