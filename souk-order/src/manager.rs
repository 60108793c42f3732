use serde::Serialize;
use souk_catalog::StockLedger;
use souk_core::identity::{Principal, Role};
use souk_core::repository::MarketTx;
use souk_core::{CoreError, CoreResult};
use souk_shared::{
    CartOrder, CartOrderItem, DeliveryStatus, Id, NewNotification, NewStrike, NotificationCategory,
    Offender, OrderStatus, Subject, VendorProfile,
};
use tracing::info;

use crate::cart::load_client;
use crate::context::{backing_cart_item, load_order, order_vendor, MarketContext};
use crate::outbox::Pending;

/// Who is tearing an order down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Canceller {
    Client,
    Vendor,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: CartOrder,
    pub lines: Vec<CartOrderItem>,
}

/// Per-vendor order and order-line state machine.
///
/// Every transition runs its cascade (stock, strikes, claims, notifications)
/// inside the same transaction as the status write.
pub struct OrderManager {
    ctx: MarketContext,
}

impl OrderManager {
    pub fn new(ctx: MarketContext) -> Self {
        Self { ctx }
    }

    pub async fn order(&self, principal: &Principal, order_id: Id) -> CoreResult<OrderDetails> {
        let mut tx = self.ctx.begin().await?;
        let order = load_order(tx.as_mut(), order_id).await?;

        let visible = match principal.role {
            Role::Client(id) => order.client_id == id,
            Role::Vendor(id) => order.vendor_id == Some(id),
            Role::DeliveryAgent(id) => {
                order.is_claimable()
                    || tx
                        .live_claim_for_order(order.id)
                        .await?
                        .is_some_and(|c| c.delivery_agent_id == id)
            }
            Role::Superuser => true,
        };
        if !visible {
            return Err(CoreError::permission("you cannot view this order"));
        }

        let lines = tx.order_lines(order.id).await?;
        Ok(OrderDetails { order, lines })
    }

    pub async fn cancel_order_by_client(&self, principal: &Principal, order_id: Id) -> CoreResult<CartOrder> {
        let client_id = principal.require_client("cancel orders")?;
        let mut tx = self.ctx.begin().await?;
        let mut order = load_order(tx.as_mut(), order_id).await?;

        if order.client_id != client_id {
            return Err(CoreError::permission("you cannot update another client's order"));
        }
        if order.order_status == OrderStatus::Delivered {
            return Err(CoreError::validation("you cannot update a delivered order"));
        }
        if order.is_canceled || !order.is_active {
            return Err(CoreError::validation("you cannot update a canceled order"));
        }
        if tx.live_claim_for_order(order.id).await?.is_some() {
            return Err(CoreError::validation(
                "you cannot cancel an order a delivery agent has already claimed",
            ));
        }

        let mut pending = Pending::new();
        cancel_order_cascade(tx.as_mut(), &mut pending, &mut order, Canceller::Client).await?;
        self.ctx.finish(tx, pending).await?;
        info!("Client {} canceled order {}", client_id, order.id);
        Ok(order)
    }

    /// Vendor-driven status change. Confirmation is a one-way gate.
    pub async fn update_order_status_by_vendor(
        &self,
        principal: &Principal,
        order_id: Id,
        status: OrderStatus,
    ) -> CoreResult<CartOrder> {
        let vendor_id = principal.require_vendor("change an order status")?;
        let mut tx = self.ctx.begin().await?;
        let mut order = load_order(tx.as_mut(), order_id).await?;

        if order.vendor_id != Some(vendor_id) {
            return Err(CoreError::permission("you cannot update another vendor's order"));
        }
        if order.is_canceled || !order.is_active || order.order_status == OrderStatus::Canceled {
            return Err(CoreError::validation("you cannot update a canceled order"));
        }
        match order.order_status {
            OrderStatus::Delivered => {
                return Err(CoreError::validation("you cannot update a delivered order"));
            }
            OrderStatus::Confirmed if status == OrderStatus::Confirmed => {
                return Err(CoreError::conflict("this order is already confirmed"));
            }
            OrderStatus::Confirmed => {
                return Err(CoreError::validation("you cannot update a confirmed order"));
            }
            _ => {}
        }
        if order.order_status == status {
            return Ok(order);
        }

        let mut pending = Pending::new();
        if status == OrderStatus::Canceled {
            cancel_order_cascade(tx.as_mut(), &mut pending, &mut order, Canceller::Vendor).await?;
        } else {
            let previous = order.order_status;
            if status.commits_stock() && !previous.commits_stock() {
                commit_order_stock(tx.as_mut(), &order).await?;
            }
            order.order_status = status;
            tx.update_cart_order(&order).await?;

            let client = load_client(tx.as_mut(), order.client_id).await?;
            pending
                .record(
                    tx.as_mut(),
                    NewNotification::new(
                        client.user_id,
                        format!("Your order #{} is now {}", order.id, status.as_str()),
                        Subject::cart_order(order.id),
                        NotificationCategory::Order,
                    ),
                )
                .await?;

            if status == OrderStatus::Confirmed
                && order.delivery_option
                && tx.live_claim_for_order(order.id).await?.is_none()
            {
                let vendor = order_vendor(tx.as_mut(), &order).await?;
                broadcast_available(tx.as_mut(), &mut pending, &order, &vendor, None).await?;
            }
        }

        self.ctx.finish(tx, pending).await?;
        info!("Vendor {} moved order {} to {}", vendor_id, order.id, order.order_status.as_str());
        Ok(order)
    }

    pub async fn confirm_order(&self, principal: &Principal, order_id: Id) -> CoreResult<CartOrder> {
        self.update_order_status_by_vendor(principal, order_id, OrderStatus::Confirmed)
            .await
    }

    pub async fn cancel_order_by_vendor(&self, principal: &Principal, order_id: Id) -> CoreResult<CartOrder> {
        self.update_order_status_by_vendor(principal, order_id, OrderStatus::Canceled)
            .await
    }

    pub async fn cancel_line_by_client(&self, principal: &Principal, line_id: Id) -> CoreResult<CartOrderItem> {
        let client_id = principal.require_client("cancel order items")?;
        let mut tx = self.ctx.begin().await?;
        let mut line = load_line(tx.as_mut(), line_id).await?;
        if line.client_id != client_id {
            return Err(CoreError::permission("you cannot update another client's order item"));
        }
        let order = load_order(tx.as_mut(), line.order_id).await?;
        ensure_line_cancelable(&order, &line)?;

        let mut pending = Pending::new();
        line.is_canceled = true;
        deactivate_line(tx.as_mut(), &mut line, order.order_status.commits_stock()).await?;
        tx.insert_strike(&NewStrike::new(
            Offender::Client(client_id),
            "you have canceled a cart order item",
        ))
        .await?;

        let vendor = order_vendor(tx.as_mut(), &order).await?;
        pending
            .record(
                tx.as_mut(),
                NewNotification::new(
                    vendor.user_id,
                    format!("The client canceled item #{} of order #{}", line.id, order.id),
                    Subject::order_line(line.id),
                    NotificationCategory::CartOrderItem,
                ),
            )
            .await?;

        self.ctx.finish(tx, pending).await?;
        info!("Client {} canceled order line {}", client_id, line.id);
        Ok(line)
    }

    pub async fn cancel_line_by_vendor(&self, principal: &Principal, line_id: Id) -> CoreResult<CartOrderItem> {
        let vendor_id = principal.require_vendor("cancel order items")?;
        let mut tx = self.ctx.begin().await?;
        let mut line = load_line(tx.as_mut(), line_id).await?;
        let order = load_order(tx.as_mut(), line.order_id).await?;
        if order.vendor_id != Some(vendor_id) {
            return Err(CoreError::permission("you cannot update another vendor's order item"));
        }
        ensure_line_cancelable(&order, &line)?;

        let mut pending = Pending::new();
        line.is_canceled_by_vendor = true;
        deactivate_line(tx.as_mut(), &mut line, order.order_status.commits_stock()).await?;

        let client = load_client(tx.as_mut(), order.client_id).await?;
        pending
            .record(
                tx.as_mut(),
                NewNotification::new(
                    client.user_id,
                    format!("The vendor canceled item #{} of your order #{}", line.id, order.id),
                    Subject::order_line(line.id),
                    NotificationCategory::CartOrderItem,
                ),
            )
            .await?;

        self.ctx.finish(tx, pending).await?;
        info!("Vendor {} canceled order line {}", vendor_id, line.id);
        Ok(line)
    }
}

async fn load_line(tx: &mut dyn MarketTx, line_id: Id) -> CoreResult<CartOrderItem> {
    tx.order_line(line_id)
        .await?
        .ok_or_else(|| CoreError::not_found("order item", line_id))
}

fn ensure_line_cancelable(order: &CartOrder, line: &CartOrderItem) -> CoreResult<()> {
    if order.order_status == OrderStatus::Delivered {
        return Err(CoreError::validation("you cannot update a delivered order"));
    }
    if !line.is_active {
        return Err(CoreError::validation("this order item is already canceled"));
    }
    Ok(())
}

/// Tear down an active order: flags, lines, in-flight claim, strike and
/// notifications. Stock comes back only if confirmation had committed it.
pub(crate) async fn cancel_order_cascade(
    tx: &mut dyn MarketTx,
    pending: &mut Pending,
    order: &mut CartOrder,
    by: Canceller,
) -> CoreResult<()> {
    let stock_committed = order.order_status.commits_stock();

    order.is_active = false;
    match by {
        Canceller::Client => order.is_canceled = true,
        Canceller::Vendor => order.order_status = OrderStatus::Canceled,
    }
    tx.update_cart_order(order).await?;

    for mut line in tx.order_lines(order.id).await? {
        match by {
            Canceller::Client => line.is_canceled = true,
            Canceller::Vendor => line.is_canceled_by_vendor = true,
        }
        if line.is_active {
            deactivate_line(tx, &mut line, stock_committed).await?;
        } else {
            tx.update_order_line(&line).await?;
        }
    }

    if let Some(mut claim) = tx.live_claim_for_order(order.id).await? {
        if claim.is_active {
            claim.delivery_status = DeliveryStatus::Canceled;
            claim.is_active = false;
            tx.update_claim(&claim).await?;
            if let Some(agent) = tx.delivery_agent(claim.delivery_agent_id).await? {
                pending
                    .record(
                        tx,
                        NewNotification::new(
                            agent.user_id,
                            format!("Order #{} was canceled, your claim is closed", order.id),
                            Subject::claim(claim.id),
                            NotificationCategory::ClaimedOrder,
                        ),
                    )
                    .await?;
            }
        }
    }

    match by {
        Canceller::Client => {
            tx.insert_strike(&NewStrike::new(
                Offender::Client(order.client_id),
                "you have canceled an order",
            ))
            .await?;
            let vendor = order_vendor(tx, order).await?;
            pending
                .record(
                    tx,
                    NewNotification::new(
                        vendor.user_id,
                        format!("The client canceled order #{}", order.id),
                        Subject::cart_order(order.id),
                        NotificationCategory::Order,
                    ),
                )
                .await?;
        }
        Canceller::Vendor => {
            let client = load_client(tx, order.client_id).await?;
            pending
                .record(
                    tx,
                    NewNotification::new(
                        client.user_id,
                        format!("The vendor canceled your order #{}", order.id),
                        Subject::cart_order(order.id),
                        NotificationCategory::Order,
                    ),
                )
                .await?;
        }
    }
    Ok(())
}

/// Close a still-active line, returning its quantity to stock when the
/// parent order had committed it.
async fn deactivate_line(tx: &mut dyn MarketTx, line: &mut CartOrderItem, restore_stock: bool) -> CoreResult<()> {
    if restore_stock {
        let item = backing_cart_item(tx, line.id, line.cart_item_id).await?;
        if let Some(mut stock) = tx.stock_item(item.product).await? {
            let change = StockLedger::restore(&mut stock, item.quantity)?;
            tx.write_stock(&stock).await?;
            info!("Restored {} units of {} ({} -> {})", item.quantity, item.product, change.before, change.after);
        }
    }
    line.is_active = false;
    tx.update_order_line(line).await
}

/// Decrement stock for every live line of an order entering confirmation.
async fn commit_order_stock(tx: &mut dyn MarketTx, order: &CartOrder) -> CoreResult<()> {
    for line in tx.order_lines(order.id).await? {
        if !line.is_active {
            continue;
        }
        let item = backing_cart_item(tx, line.id, line.cart_item_id).await?;
        let Some(mut stock) = tx.stock_item(item.product).await? else {
            continue;
        };
        let change = StockLedger::commit(&mut stock, item.quantity)?;
        tx.write_stock(&stock).await?;
        if change.depleted() {
            let hidden = tx.deactivate_open_cart_items(item.product).await?;
            info!("{} is out of stock, hid {} cart items", item.product, hidden);
        }
    }
    Ok(())
}

/// Tell every delivery agent in the vendor's city that an order can be claimed.
pub(crate) async fn broadcast_available(
    tx: &mut dyn MarketTx,
    pending: &mut Pending,
    order: &CartOrder,
    vendor: &VendorProfile,
    exclude_agent: Option<Id>,
) -> CoreResult<()> {
    let agents = tx.delivery_agents_in_city(&vendor.city).await?;
    for agent in agents {
        if agent.is_banned || Some(agent.id) == exclude_agent {
            continue;
        }
        pending
            .record(
                tx,
                NewNotification::new(
                    agent.user_id,
                    format!("A new order #{} is ready to be claimed in {}", order.id, vendor.city),
                    Subject::cart_order(order.id),
                    NotificationCategory::Order,
                ),
            )
            .await?;
    }
    Ok(())
}
