use serde::{Deserialize, Serialize};
use souk_shared::ProductRef;

use crate::product::StockItem;

/// Outcome of one stock write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub reference: ProductRef,
    pub before: i32,
    pub after: i32,
}

impl StockChange {
    /// Stock just ran out; unordered cart items for it must be deactivated.
    pub fn depleted(&self) -> bool {
        self.after == 0
    }
}

/// Rules for mutating product stock.
///
/// Quantity moves at exactly two points: it is committed (decremented) once
/// when a vendor confirms an order and restored when an order line is
/// canceled. Checkout itself never touches stock. Every write recomputes
/// `in_stock` from the new quantity.
pub struct StockLedger;

impl StockLedger {
    /// Check a cart selection against the current stock.
    pub fn check_available(item: &StockItem, requested: i32) -> Result<(), InventoryError> {
        if requested < 1 {
            return Err(InventoryError::InvalidQuantity(requested));
        }
        if !item.can_supply(requested) {
            return Err(InventoryError::InsufficientInventory {
                reference: item.reference,
                requested,
                available: item.quantity,
            });
        }
        Ok(())
    }

    /// Decrement stock for a confirmed order line.
    pub fn commit(item: &mut StockItem, quantity: i32) -> Result<StockChange, InventoryError> {
        if quantity < 1 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        if item.quantity < quantity {
            return Err(InventoryError::InsufficientInventory {
                reference: item.reference,
                requested: quantity,
                available: item.quantity,
            });
        }
        Ok(Self::write(item, item.quantity - quantity))
    }

    /// Put a canceled line's quantity back.
    pub fn restore(item: &mut StockItem, quantity: i32) -> Result<StockChange, InventoryError> {
        if quantity < 1 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        let after = item
            .quantity
            .checked_add(quantity)
            .ok_or(InventoryError::Overflow(item.reference))?;
        Ok(Self::write(item, after))
    }

    fn write(item: &mut StockItem, quantity: i32) -> StockChange {
        let before = item.quantity;
        item.quantity = quantity;
        item.in_stock = quantity > 0;
        StockChange {
            reference: item.reference,
            before,
            after: quantity,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),

    #[error("insufficient stock for {reference}: requested {requested}, available {available}")]
    InsufficientInventory {
        reference: ProductRef,
        requested: i32,
        available: i32,
    },

    #[error("stock counter overflow for {0}")]
    Overflow(ProductRef),
}
