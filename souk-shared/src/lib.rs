//! Entity models shared by every crate of the marketplace backend.

pub mod models;

pub use models::{
    cart::{CartItem, NewCartItem, ShoppingCart},
    catalog::ProductRef,
    claim::{CancellationReason, CancellationRequest, ClaimedOrder, DeliveryStatus, NewClaim},
    notification::{NewNotification, Notification, NotificationCategory, Subject, SubjectKind},
    order::{CartOrder, CartOrderItem, GlobalOrder, NewCartOrder, NewGlobalOrder, NewOrderLine, OrderStatus, PaymentMethod},
    profile::{ClientProfile, DeliveryAgentProfile, VendorProfile},
    strike::{NewStrike, Offender, Strike},
};

/// Row identifier used by every persisted entity.
pub type Id = i64;

/// Returned when a stored enum label does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseLabelError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}
