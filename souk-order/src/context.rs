use souk_core::notify::NotificationSink;
use souk_core::repository::{MarketStore, MarketTx};
use souk_core::rules::BusinessRules;
use souk_core::{CoreError, CoreResult};
use souk_shared::{CartItem, CartOrder, ClaimedOrder, Id, VendorProfile};
use std::sync::Arc;

use crate::outbox::{Outbox, Pending};

/// Everything a marketplace service needs: the store, the notification
/// outbox and the tunable rules.
#[derive(Clone)]
pub struct MarketContext {
    pub store: Arc<dyn MarketStore>,
    pub outbox: Outbox,
    pub rules: BusinessRules,
}

impl MarketContext {
    pub fn new(store: Arc<dyn MarketStore>, sink: Arc<dyn NotificationSink>, rules: BusinessRules) -> Self {
        Self {
            store,
            outbox: Outbox::new(sink),
            rules,
        }
    }

    pub(crate) async fn begin(&self) -> CoreResult<Box<dyn MarketTx>> {
        self.store.begin().await
    }

    /// Commit, then push the notifications the transaction wrote.
    pub(crate) async fn finish(&self, tx: Box<dyn MarketTx>, pending: Pending) -> CoreResult<()> {
        tx.commit().await?;
        self.outbox.dispatch(pending).await;
        Ok(())
    }
}

pub(crate) async fn load_order(tx: &mut dyn MarketTx, id: Id) -> CoreResult<CartOrder> {
    tx.cart_order(id).await?.ok_or_else(|| CoreError::not_found("order", id))
}

pub(crate) async fn load_claim(tx: &mut dyn MarketTx, id: Id) -> CoreResult<ClaimedOrder> {
    tx.claim(id).await?.ok_or_else(|| CoreError::not_found("claim", id))
}

/// Vendor of an order that is about to be delivered or broadcast.
pub(crate) async fn order_vendor(tx: &mut dyn MarketTx, order: &CartOrder) -> CoreResult<VendorProfile> {
    let vendor_id = order
        .vendor_id
        .ok_or_else(|| CoreError::integrity(format!("order {} has no vendor", order.id)))?;
    tx.vendor(vendor_id)
        .await?
        .ok_or_else(|| CoreError::integrity(format!("order {} references missing vendor {}", order.id, vendor_id)))
}

/// The cart item an order line was created from.
pub(crate) async fn backing_cart_item(tx: &mut dyn MarketTx, line_id: Id, cart_item_id: Id) -> CoreResult<CartItem> {
    tx.cart_item(cart_item_id).await?.ok_or_else(|| {
        CoreError::integrity(format!(
            "order line {} has no backing cart item {}",
            line_id, cart_item_id
        ))
    })
}
