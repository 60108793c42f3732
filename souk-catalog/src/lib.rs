pub mod product;
pub mod pricing;
pub mod inventory;

pub use product::{FoodProduct, Product, StockItem};
pub use pricing::{PricingRules, VendorGroupTotal};
pub use inventory::{InventoryError, StockChange, StockLedger};
