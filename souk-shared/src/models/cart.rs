use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{models::catalog::ProductRef, Id};

/// One cart per client, created together with the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShoppingCart {
    pub id: Id,
    pub client_id: Id,
    pub created_at: DateTime<Utc>,
}

/// A product selection sitting in a cart.
///
/// Once `is_ordered` flips the item is frozen: it backs exactly one order line
/// and is kept for history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartItem {
    pub id: Id,
    pub shopping_cart_id: Id,
    pub product: ProductRef,
    pub quantity: i32,
    pub size: Option<String>,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub is_ordered: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Unordered and still visible in the cart.
    pub fn is_open(&self) -> bool {
        !self.is_ordered && self.is_active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCartItem {
    pub shopping_cart_id: Id,
    pub product: ProductRef,
    pub quantity: i32,
    pub size: Option<String>,
    pub unit_price_cents: i64,
}

impl NewCartItem {
    pub fn total_price_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}
