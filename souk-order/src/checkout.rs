use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use souk_catalog::{PricingRules, VendorGroupTotal};
use souk_core::identity::Principal;
use souk_core::{CoreError, CoreResult};
use souk_shared::{
    CartItem, CartOrder, CartOrderItem, GlobalOrder, Id, NewCartOrder, NewGlobalOrder,
    NewNotification, NewOrderLine, NotificationCategory, PaymentMethod, Subject,
};
use std::collections::BTreeMap;
use tracing::info;

use crate::cart::{client_cart, load_client};
use crate::context::MarketContext;
use crate::outbox::Pending;

/// Shipping and payment details of one "pay" action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub address: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub delivery_option: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    pub order: CartOrder,
    pub lines: Vec<CartOrderItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub global_order: GlobalOrder,
    pub orders: Vec<PlacedOrder>,
}

/// One vendor's share of a cart, priced at checkout time.
struct VendorGroup {
    vendor_id: Id,
    vendor_user_id: Id,
    lines: Vec<(CartItem, i64)>,
}

impl VendorGroup {
    fn total(&self) -> VendorGroupTotal {
        VendorGroupTotal {
            vendor_id: self.vendor_id,
            items_cents: self.lines.iter().map(|(_, cents)| cents).sum(),
        }
    }
}

/// Splits a client's cart into one global order and one order per vendor.
pub struct CheckoutSplitter {
    ctx: MarketContext,
}

impl CheckoutSplitter {
    pub fn new(ctx: MarketContext) -> Self {
        Self { ctx }
    }

    pub async fn checkout(
        &self,
        principal: &Principal,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<CheckoutReceipt> {
        let client_id = principal.require_client("check out")?;
        let rules = &self.ctx.rules;
        let mut tx = self.ctx.begin().await?;

        let client = load_client(tx.as_mut(), client_id).await?;
        if client.is_banned {
            return Err(CoreError::validation("banned clients cannot place orders"));
        }
        let cart = client_cart(tx.as_mut(), client_id).await?;
        let items: Vec<CartItem> = tx
            .cart_items(cart.id)
            .await?
            .into_iter()
            .filter(CartItem::is_open)
            .collect();
        if items.is_empty() {
            return Err(CoreError::validation("your shopping cart is empty"));
        }

        let open_lines = tx
            .count_undelivered_lines_since(client_id, now - rules.throttle_window())
            .await?;
        if open_lines >= rules.throttle_max_open_lines {
            return Err(CoreError::validation(format!(
                "you already have {} undelivered order items from the last {} days",
                open_lines, rules.throttle_window_days
            )));
        }

        // Group by vendor, rejecting anything sold outside the client's city.
        let mut groups: BTreeMap<Id, VendorGroup> = BTreeMap::new();
        for item in items {
            let stock = tx.stock_item(item.product).await?.ok_or_else(|| {
                CoreError::integrity(format!("cart item {} references missing {}", item.id, item.product))
            })?;
            let vendor = tx.vendor(stock.vendor_id).await?.ok_or_else(|| {
                CoreError::integrity(format!("{} references missing vendor {}", item.product, stock.vendor_id))
            })?;
            if vendor.city != client.city {
                return Err(CoreError::validation(format!(
                    "{} is sold by a vendor outside {}",
                    stock.title, client.city
                )));
            }
            let line_cents = PricingRules::line_total(stock.price_cents, item.quantity);
            groups
                .entry(vendor.id)
                .or_insert_with(|| VendorGroup {
                    vendor_id: vendor.id,
                    vendor_user_id: vendor.user_id,
                    lines: Vec::new(),
                })
                .lines
                .push((item, line_cents));
        }

        let pricing = rules.pricing();
        let totals: Vec<VendorGroupTotal> = groups.values().map(VendorGroup::total).collect();
        let global_order = tx
            .insert_global_order(&NewGlobalOrder {
                shopping_cart_id: cart.id,
                client_id,
                total_price_cents: pricing.global_total(&totals, request.delivery_option),
                payment_method: request.payment_method,
                address: request.address,
                city: request.city,
                country: request.country,
                delivery_option: request.delivery_option,
            })
            .await?;

        let mut pending = Pending::new();
        let mut orders = Vec::with_capacity(groups.len());
        for group in groups.into_values() {
            let order = tx
                .insert_cart_order(&NewCartOrder {
                    global_order_id: global_order.id,
                    client_id,
                    vendor_id: group.vendor_id,
                    total_payed_cents: pricing.vendor_order_total(&group.total(), request.delivery_option),
                    payment_method: PaymentMethod::Cod,
                    delivery_option: request.delivery_option,
                })
                .await?;

            let mut lines = Vec::with_capacity(group.lines.len());
            for (item, cents) in &group.lines {
                let line = tx
                    .insert_order_line(&NewOrderLine {
                        order_id: order.id,
                        client_id,
                        cart_item_id: item.id,
                        total_payed_cents: *cents,
                    })
                    .await?;
                tx.mark_cart_item_ordered(item.id).await?;
                lines.push(line);
            }

            pending
                .record(
                    tx.as_mut(),
                    NewNotification::new(
                        group.vendor_user_id,
                        format!("You have received a new order #{}", order.id),
                        Subject::cart_order(order.id),
                        NotificationCategory::Order,
                    ),
                )
                .await?;
            pending
                .record(
                    tx.as_mut(),
                    NewNotification::new(
                        client.user_id,
                        format!("Your order #{} has been placed", order.id),
                        Subject::cart_order(order.id),
                        NotificationCategory::Order,
                    ),
                )
                .await?;
            orders.push(PlacedOrder { order, lines });
        }

        self.ctx.finish(tx, pending).await?;
        info!(
            "Client {} checked out global order {} into {} vendor orders ({} cents)",
            client_id,
            global_order.id,
            orders.len(),
            global_order.total_price_cents
        );
        Ok(CheckoutReceipt { global_order, orders })
    }

    pub async fn global_orders(&self, principal: &Principal) -> CoreResult<Vec<GlobalOrder>> {
        let client_id = principal.require_client("list global orders")?;
        let mut tx = self.ctx.begin().await?;
        tx.global_orders_for_client(client_id).await
    }
}
