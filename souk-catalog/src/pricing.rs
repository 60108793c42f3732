use serde::{Deserialize, Serialize};
use souk_shared::Id;

/// Pricing knobs applied at checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingRules {
    /// Flat fee added once per vendor when delivery is requested.
    pub delivery_surcharge_cents: i64,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            delivery_surcharge_cents: 2000,
        }
    }
}

/// Items subtotal for one vendor group of a checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorGroupTotal {
    pub vendor_id: Id,
    pub items_cents: i64,
}

impl PricingRules {
    pub fn line_total(unit_price_cents: i64, quantity: i32) -> i64 {
        unit_price_cents * i64::from(quantity)
    }

    fn surcharge(&self, delivery_option: bool) -> i64 {
        if delivery_option {
            self.delivery_surcharge_cents
        } else {
            0
        }
    }

    /// Amount payable on one per-vendor order.
    pub fn vendor_order_total(&self, group: &VendorGroupTotal, delivery_option: bool) -> i64 {
        group.items_cents + self.surcharge(delivery_option)
    }

    /// Amount payable on the whole checkout envelope.
    pub fn global_total(&self, groups: &[VendorGroupTotal], delivery_option: bool) -> i64 {
        let items: i64 = groups.iter().map(|g| g.items_cents).sum();
        let vendors = i64::try_from(groups.len()).unwrap_or(i64::MAX);
        items + vendors.saturating_mul(self.surcharge(delivery_option))
    }
}
