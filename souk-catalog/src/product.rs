use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use souk_shared::{Id, ProductRef};

/// Vendor-owned physical product as the order core sees it.
///
/// Catalog CRUD lives elsewhere; the core only reads price/vendor and writes
/// the `quantity`/`in_stock` pair through the stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: Id,
    pub vendor_id: Id,
    pub title: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub in_stock: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Food item sold by a vendor; stocked the same way as a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoodProduct {
    pub id: Id,
    pub vendor_id: Id,
    pub title: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub in_stock: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Uniform stock view over either catalog table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockItem {
    pub reference: ProductRef,
    pub vendor_id: Id,
    pub title: String,
    pub price_cents: i64,
    pub quantity: i32,
    pub in_stock: bool,
    pub is_active: bool,
}

impl StockItem {
    /// Orderable right now for `quantity` units.
    pub fn can_supply(&self, quantity: i32) -> bool {
        self.is_active && self.in_stock && self.quantity >= quantity
    }
}

impl From<&Product> for StockItem {
    fn from(p: &Product) -> Self {
        Self {
            reference: ProductRef::Physical(p.id),
            vendor_id: p.vendor_id,
            title: p.title.clone(),
            price_cents: p.price_cents,
            quantity: p.quantity,
            in_stock: p.in_stock,
            is_active: p.is_active,
        }
    }
}

impl From<&FoodProduct> for StockItem {
    fn from(p: &FoodProduct) -> Self {
        Self {
            reference: ProductRef::Food(p.id),
            vendor_id: p.vendor_id,
            title: p.title.clone(),
            price_cents: p.price_cents,
            quantity: p.quantity,
            in_stock: p.in_stock,
            is_active: p.is_active,
        }
    }
}
