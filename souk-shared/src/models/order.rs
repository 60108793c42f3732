use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Id, ParseLabelError};

/// Declared payment method. No processor is involved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cod,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Online => "online",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(PaymentMethod::Cod),
            "online" => Ok(PaymentMethod::Online),
            other => Err(ParseLabelError::new("payment method", other)),
        }
    }
}

/// Per-vendor order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Processing,
    Confirmed,
    Shipped,
    Delivered,
    Canceled,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "processing",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Returned => "returned",
        }
    }

    /// Statuses at which vendor stock has been committed.
    pub fn commits_stock(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Delivered)
    }
}

impl FromStr for OrderStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(OrderStatus::Processing),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "canceled" => Ok(OrderStatus::Canceled),
            "returned" => Ok(OrderStatus::Returned),
            other => Err(ParseLabelError::new("order status", other)),
        }
    }
}

/// The checkout envelope created by one "pay" action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalOrder {
    pub id: Id,
    pub shopping_cart_id: Id,
    pub client_id: Id,
    pub total_price_cents: i64,
    pub payment_method: PaymentMethod,
    pub address: String,
    pub city: String,
    pub country: String,
    pub delivery_option: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGlobalOrder {
    pub shopping_cart_id: Id,
    pub client_id: Id,
    pub total_price_cents: i64,
    pub payment_method: PaymentMethod,
    pub address: String,
    pub city: String,
    pub country: String,
    pub delivery_option: bool,
}

/// A per-vendor order split out of a global order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartOrder {
    pub id: Id,
    pub global_order_id: Id,
    pub client_id: Id,
    pub vendor_id: Option<Id>,
    pub total_payed_cents: i64,
    pub payment_method: PaymentMethod,
    pub delivery_option: bool,
    pub order_status: OrderStatus,
    pub is_canceled: bool,
    pub is_active: bool,
    pub order_date: DateTime<Utc>,
}

impl CartOrder {
    /// Ready to be picked up by a delivery agent, ignoring existing claims.
    pub fn is_claimable(&self) -> bool {
        self.order_status == OrderStatus::Confirmed
            && self.is_active
            && !self.is_canceled
            && self.delivery_option
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCartOrder {
    pub global_order_id: Id,
    pub client_id: Id,
    pub vendor_id: Id,
    pub total_payed_cents: i64,
    pub payment_method: PaymentMethod,
    pub delivery_option: bool,
}

/// Order line; one-to-one with the cart item it was folded from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartOrderItem {
    pub id: Id,
    pub order_id: Id,
    pub client_id: Id,
    pub cart_item_id: Id,
    pub total_payed_cents: i64,
    pub is_canceled: bool,
    pub is_canceled_by_vendor: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub order_id: Id,
    pub client_id: Id,
    pub cart_item_id: Id,
    pub total_payed_cents: i64,
}
