use async_trait::async_trait;
use chrono::{DateTime, Utc};
use souk_catalog::StockItem;
use souk_shared::{
    CancellationReason, CancellationRequest, CartItem, CartOrder, CartOrderItem, ClaimedOrder,
    ClientProfile, DeliveryAgentProfile, GlobalOrder, Id, NewCartItem, NewCartOrder, NewClaim,
    NewGlobalOrder, NewNotification, NewOrderLine, NewStrike, Notification, Offender,
    ProductRef, ShoppingCart, Strike, VendorProfile,
};

use crate::CoreResult;

/// Entry point to the shared relational store.
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Open a unit of work. Dropping it without [`MarketTx::commit`] rolls
    /// every write back.
    async fn begin(&self) -> CoreResult<Box<dyn MarketTx>>;
}

/// One atomic unit of work against the store.
///
/// Reads of orders, claims and stock lock the rows they return until the
/// transaction ends, so a read-check-write sequence inside one transaction
/// cannot interleave with another writer.
#[async_trait]
pub trait MarketTx: Send {
    // ---- profiles -------------------------------------------------------

    async fn client(&mut self, id: Id) -> CoreResult<Option<ClientProfile>>;

    async fn vendor(&mut self, id: Id) -> CoreResult<Option<VendorProfile>>;

    async fn delivery_agent(&mut self, id: Id) -> CoreResult<Option<DeliveryAgentProfile>>;

    async fn delivery_agents_in_city(&mut self, city: &str) -> CoreResult<Vec<DeliveryAgentProfile>>;

    /// Record a new client and open its shopping cart.
    async fn register_client(&mut self, profile: &ClientProfile) -> CoreResult<ShoppingCart>;

    // ---- catalog --------------------------------------------------------

    async fn stock_item(&mut self, product: ProductRef) -> CoreResult<Option<StockItem>>;

    /// Persist the `quantity`/`in_stock` pair of a stock item.
    async fn write_stock(&mut self, item: &StockItem) -> CoreResult<()>;

    // ---- cart -----------------------------------------------------------

    async fn cart_for_client(&mut self, client_id: Id) -> CoreResult<Option<ShoppingCart>>;

    async fn cart_items(&mut self, cart_id: Id) -> CoreResult<Vec<CartItem>>;

    async fn cart_item(&mut self, id: Id) -> CoreResult<Option<CartItem>>;

    /// Fails with a validation error when the product already sits unordered
    /// in the same cart.
    async fn insert_cart_item(&mut self, item: &NewCartItem) -> CoreResult<CartItem>;

    async fn mark_cart_item_ordered(&mut self, id: Id) -> CoreResult<()>;

    async fn delete_cart_item(&mut self, id: Id) -> CoreResult<()>;

    /// Hide every unordered cart item pointing at `product`. Returns how many.
    async fn deactivate_open_cart_items(&mut self, product: ProductRef) -> CoreResult<u64>;

    // ---- orders ---------------------------------------------------------

    async fn insert_global_order(&mut self, order: &NewGlobalOrder) -> CoreResult<GlobalOrder>;

    async fn global_orders_for_client(&mut self, client_id: Id) -> CoreResult<Vec<GlobalOrder>>;

    async fn insert_cart_order(&mut self, order: &NewCartOrder) -> CoreResult<CartOrder>;

    async fn cart_order(&mut self, id: Id) -> CoreResult<Option<CartOrder>>;

    async fn update_cart_order(&mut self, order: &CartOrder) -> CoreResult<()>;

    async fn insert_order_line(&mut self, line: &NewOrderLine) -> CoreResult<CartOrderItem>;

    async fn order_line(&mut self, id: Id) -> CoreResult<Option<CartOrderItem>>;

    async fn order_lines(&mut self, order_id: Id) -> CoreResult<Vec<CartOrderItem>>;

    async fn update_order_line(&mut self, line: &CartOrderItem) -> CoreResult<()>;

    /// Order lines of `client_id` created at or after `since` whose order is
    /// not delivered yet.
    async fn count_undelivered_lines_since(
        &mut self,
        client_id: Id,
        since: DateTime<Utc>,
    ) -> CoreResult<i64>;

    // ---- claims ---------------------------------------------------------

    /// Fails with [`crate::CoreError::Conflict`] when the order already has a
    /// non-failed claim.
    async fn insert_claim(&mut self, claim: &NewClaim) -> CoreResult<ClaimedOrder>;

    async fn claim(&mut self, id: Id) -> CoreResult<Option<ClaimedOrder>>;

    async fn update_claim(&mut self, claim: &ClaimedOrder) -> CoreResult<()>;

    /// The non-failed, not yet delivered claim on an order, if any.
    async fn live_claim_for_order(&mut self, order_id: Id) -> CoreResult<Option<ClaimedOrder>>;

    async fn active_claim_for_agent(&mut self, agent_id: Id) -> CoreResult<Option<ClaimedOrder>>;

    async fn has_failed_claim(&mut self, agent_id: Id, order_id: Id) -> CoreResult<bool>;

    /// Active claims past their deadline, unconfirmed and not yet failed.
    async fn overdue_claims(&mut self, now: DateTime<Utc>) -> CoreResult<Vec<ClaimedOrder>>;

    // ---- cancellation requests -----------------------------------------

    async fn insert_cancellation_request(
        &mut self,
        claim_id: Id,
        reason: CancellationReason,
    ) -> CoreResult<CancellationRequest>;

    async fn cancellation_request(&mut self, id: Id) -> CoreResult<Option<CancellationRequest>>;

    async fn cancellation_request_for_claim(
        &mut self,
        claim_id: Id,
    ) -> CoreResult<Option<CancellationRequest>>;

    async fn update_cancellation_request(&mut self, request: &CancellationRequest) -> CoreResult<()>;

    // ---- strikes --------------------------------------------------------

    async fn insert_strike(&mut self, strike: &NewStrike) -> CoreResult<Strike>;

    async fn strikes_for(&mut self, offender: Offender) -> CoreResult<Vec<Strike>>;

    // ---- notifications --------------------------------------------------

    async fn insert_notification(&mut self, notification: &NewNotification) -> CoreResult<Notification>;

    async fn notification(&mut self, id: Id) -> CoreResult<Option<Notification>>;

    async fn notifications_for_user(&mut self, user_id: Id) -> CoreResult<Vec<Notification>>;

    async fn mark_notification_read(&mut self, id: Id) -> CoreResult<()>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;
}
