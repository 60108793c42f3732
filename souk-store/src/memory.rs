use async_trait::async_trait;
use chrono::{DateTime, Utc};
use souk_catalog::{FoodProduct, Product, StockItem};
use souk_core::repository::{MarketStore, MarketTx};
use souk_core::{CoreError, CoreResult};
use souk_shared::{
    CancellationReason, CancellationRequest, CartItem, CartOrder, CartOrderItem, ClaimedOrder,
    ClientProfile, DeliveryAgentProfile, DeliveryStatus, GlobalOrder, Id, NewCartItem,
    NewCartOrder, NewClaim, NewGlobalOrder, NewNotification, NewOrderLine, NewStrike,
    Notification, Offender, OrderStatus, ProductRef, ShoppingCart, Strike, VendorProfile,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
struct MarketState {
    last_id: Id,
    clients: BTreeMap<Id, ClientProfile>,
    vendors: BTreeMap<Id, VendorProfile>,
    agents: BTreeMap<Id, DeliveryAgentProfile>,
    products: BTreeMap<Id, Product>,
    food_products: BTreeMap<Id, FoodProduct>,
    carts: BTreeMap<Id, ShoppingCart>,
    cart_items: BTreeMap<Id, CartItem>,
    global_orders: BTreeMap<Id, GlobalOrder>,
    cart_orders: BTreeMap<Id, CartOrder>,
    order_lines: BTreeMap<Id, CartOrderItem>,
    claims: BTreeMap<Id, ClaimedOrder>,
    cancellation_requests: BTreeMap<Id, CancellationRequest>,
    strikes: BTreeMap<Id, Strike>,
    notifications: BTreeMap<Id, Notification>,
}

impl MarketState {
    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        self.last_id
    }

    fn open_cart(&mut self, client_id: Id) -> ShoppingCart {
        if let Some(cart) = self.carts.values().find(|c| c.client_id == client_id) {
            return cart.clone();
        }
        let cart = ShoppingCart {
            id: self.next_id(),
            client_id,
            created_at: Utc::now(),
        };
        self.carts.insert(cart.id, cart.clone());
        cart
    }
}

/// In-process store with the same transactional contract as Postgres.
///
/// Transactions are serialised behind one async mutex and work on a copy of
/// the state that replaces the shared state only on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MarketState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_client(&self, full_name: &str, city: &str) -> (ClientProfile, ShoppingCart) {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let profile = ClientProfile {
            id,
            user_id: 1000 + id,
            full_name: full_name.to_string(),
            city: city.to_string(),
            is_banned: false,
        };
        state.clients.insert(id, profile.clone());
        let cart = state.open_cart(id);
        (profile, cart)
    }

    pub async fn seed_vendor(&self, full_name: &str, city: &str) -> VendorProfile {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let profile = VendorProfile {
            id,
            user_id: 1000 + id,
            full_name: full_name.to_string(),
            city: city.to_string(),
            is_banned: false,
        };
        state.vendors.insert(id, profile.clone());
        profile
    }

    pub async fn seed_delivery_agent(&self, full_name: &str, city: &str) -> DeliveryAgentProfile {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let profile = DeliveryAgentProfile {
            id,
            user_id: 1000 + id,
            full_name: full_name.to_string(),
            city: city.to_string(),
            is_banned: false,
        };
        state.agents.insert(id, profile.clone());
        profile
    }

    pub async fn seed_product(&self, vendor_id: Id, title: &str, price_cents: i64, quantity: i32) -> Product {
        let mut state = self.state.lock().await;
        let product = Product {
            id: state.next_id(),
            vendor_id,
            title: title.to_string(),
            price_cents,
            quantity,
            in_stock: quantity > 0,
            is_active: true,
            created_at: Utc::now(),
        };
        state.products.insert(product.id, product.clone());
        product
    }

    pub async fn seed_food_product(&self, vendor_id: Id, title: &str, price_cents: i64, quantity: i32) -> FoodProduct {
        let mut state = self.state.lock().await;
        let food = FoodProduct {
            id: state.next_id(),
            vendor_id,
            title: title.to_string(),
            price_cents,
            quantity,
            in_stock: quantity > 0,
            is_active: true,
            created_at: Utc::now(),
        };
        state.food_products.insert(food.id, food.clone());
        food
    }

    pub async fn set_banned_client(&self, client_id: Id, banned: bool) {
        if let Some(client) = self.state.lock().await.clients.get_mut(&client_id) {
            client.is_banned = banned;
        }
    }

    /// Backdate a claim's deadline, as if its pickup window had elapsed.
    pub async fn set_claim_expiration(&self, claim_id: Id, at: DateTime<Utc>) {
        if let Some(claim) = self.state.lock().await.claims.get_mut(&claim_id) {
            claim.expiration_date_time = at;
        }
    }

    pub async fn claims_for_order(&self, order_id: Id) -> Vec<ClaimedOrder> {
        self.state
            .lock()
            .await
            .claims
            .values()
            .filter(|c| c.order_id == order_id)
            .cloned()
            .collect()
    }

    pub async fn cart_orders_for_global(&self, global_order_id: Id) -> Vec<CartOrder> {
        self.state
            .lock()
            .await
            .cart_orders
            .values()
            .filter(|o| o.global_order_id == global_order_id)
            .cloned()
            .collect()
    }

    pub async fn count_cart_orders(&self) -> usize {
        self.state.lock().await.cart_orders.len()
    }

    pub async fn count_order_lines(&self) -> usize {
        self.state.lock().await.order_lines.len()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn begin(&self) -> CoreResult<Box<dyn MarketTx>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTx { guard, work: None }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MarketState>,
    /// Private copy, taken on the first write.
    work: Option<MarketState>,
}

impl MemoryTx {
    fn state(&self) -> &MarketState {
        self.work.as_ref().unwrap_or(&*self.guard)
    }

    fn state_mut(&mut self) -> &mut MarketState {
        let shared = &self.guard;
        self.work.get_or_insert_with(|| MarketState::clone(shared))
    }

    fn stock_view(&self, product: ProductRef) -> Option<StockItem> {
        match product {
            ProductRef::Physical(id) => self.state().products.get(&id).map(StockItem::from),
            ProductRef::Food(id) => self.state().food_products.get(&id).map(StockItem::from),
        }
    }

    fn missing(what: &str, id: Id) -> CoreError {
        CoreError::integrity(format!("cannot update missing {} {}", what, id))
    }
}

#[async_trait]
impl MarketTx for MemoryTx {
    async fn client(&mut self, id: Id) -> CoreResult<Option<ClientProfile>> {
        Ok(self.state().clients.get(&id).cloned())
    }

    async fn vendor(&mut self, id: Id) -> CoreResult<Option<VendorProfile>> {
        Ok(self.state().vendors.get(&id).cloned())
    }

    async fn delivery_agent(&mut self, id: Id) -> CoreResult<Option<DeliveryAgentProfile>> {
        Ok(self.state().agents.get(&id).cloned())
    }

    async fn delivery_agents_in_city(&mut self, city: &str) -> CoreResult<Vec<DeliveryAgentProfile>> {
        Ok(self.state().agents.values().filter(|a| a.city == city).cloned().collect())
    }

    async fn register_client(&mut self, profile: &ClientProfile) -> CoreResult<ShoppingCart> {
        let state = self.state_mut();
        state.clients.insert(profile.id, profile.clone());
        state.last_id = state.last_id.max(profile.id);
        Ok(state.open_cart(profile.id))
    }

    async fn stock_item(&mut self, product: ProductRef) -> CoreResult<Option<StockItem>> {
        Ok(self.stock_view(product))
    }

    async fn write_stock(&mut self, item: &StockItem) -> CoreResult<()> {
        match item.reference {
            ProductRef::Physical(id) => {
                let product = self.state_mut().products.get_mut(&id).ok_or_else(|| Self::missing("product", id))?;
                product.quantity = item.quantity;
                product.in_stock = item.in_stock;
            }
            ProductRef::Food(id) => {
                let food = self.state_mut().food_products.get_mut(&id).ok_or_else(|| Self::missing("food product", id))?;
                food.quantity = item.quantity;
                food.in_stock = item.in_stock;
            }
        }
        Ok(())
    }

    async fn cart_for_client(&mut self, client_id: Id) -> CoreResult<Option<ShoppingCart>> {
        Ok(self.state().carts.values().find(|c| c.client_id == client_id).cloned())
    }

    async fn cart_items(&mut self, cart_id: Id) -> CoreResult<Vec<CartItem>> {
        Ok(self
            .state()
            .cart_items
            .values()
            .filter(|i| i.shopping_cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn cart_item(&mut self, id: Id) -> CoreResult<Option<CartItem>> {
        Ok(self.state().cart_items.get(&id).cloned())
    }

    async fn insert_cart_item(&mut self, item: &NewCartItem) -> CoreResult<CartItem> {
        let duplicate = self.state_mut().cart_items.values().any(|i| {
            i.shopping_cart_id == item.shopping_cart_id && i.product == item.product && !i.is_ordered
        });
        if duplicate {
            return Err(CoreError::validation("this product already exists in your shopping cart"));
        }
        let now = Utc::now();
        let row = CartItem {
            id: self.state_mut().next_id(),
            shopping_cart_id: item.shopping_cart_id,
            product: item.product,
            quantity: item.quantity,
            size: item.size.clone(),
            unit_price_cents: item.unit_price_cents,
            total_price_cents: item.total_price_cents(),
            is_ordered: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.state_mut().cart_items.insert(row.id, row.clone());
        Ok(row)
    }

    async fn mark_cart_item_ordered(&mut self, id: Id) -> CoreResult<()> {
        let item = self.state_mut().cart_items.get_mut(&id).ok_or_else(|| Self::missing("cart item", id))?;
        item.is_ordered = true;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: Id) -> CoreResult<()> {
        self.state_mut().cart_items.remove(&id);
        Ok(())
    }

    async fn deactivate_open_cart_items(&mut self, product: ProductRef) -> CoreResult<u64> {
        let mut count = 0;
        for item in self.state_mut().cart_items.values_mut() {
            if item.product == product && item.is_open() {
                item.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_global_order(&mut self, order: &NewGlobalOrder) -> CoreResult<GlobalOrder> {
        let row = GlobalOrder {
            id: self.state_mut().next_id(),
            shopping_cart_id: order.shopping_cart_id,
            client_id: order.client_id,
            total_price_cents: order.total_price_cents,
            payment_method: order.payment_method,
            address: order.address.clone(),
            city: order.city.clone(),
            country: order.country.clone(),
            delivery_option: order.delivery_option,
            created_at: Utc::now(),
        };
        self.state_mut().global_orders.insert(row.id, row.clone());
        Ok(row)
    }

    async fn global_orders_for_client(&mut self, client_id: Id) -> CoreResult<Vec<GlobalOrder>> {
        Ok(self
            .state()
            .global_orders
            .values()
            .filter(|o| o.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn insert_cart_order(&mut self, order: &NewCartOrder) -> CoreResult<CartOrder> {
        let row = CartOrder {
            id: self.state_mut().next_id(),
            global_order_id: order.global_order_id,
            client_id: order.client_id,
            vendor_id: Some(order.vendor_id),
            total_payed_cents: order.total_payed_cents,
            payment_method: order.payment_method,
            delivery_option: order.delivery_option,
            order_status: OrderStatus::Processing,
            is_canceled: false,
            is_active: true,
            order_date: Utc::now(),
        };
        self.state_mut().cart_orders.insert(row.id, row.clone());
        Ok(row)
    }

    async fn cart_order(&mut self, id: Id) -> CoreResult<Option<CartOrder>> {
        Ok(self.state().cart_orders.get(&id).cloned())
    }

    async fn update_cart_order(&mut self, order: &CartOrder) -> CoreResult<()> {
        let row = self.state_mut().cart_orders.get_mut(&order.id).ok_or_else(|| Self::missing("order", order.id))?;
        *row = order.clone();
        Ok(())
    }

    async fn insert_order_line(&mut self, line: &NewOrderLine) -> CoreResult<CartOrderItem> {
        if self.state_mut().order_lines.values().any(|l| l.cart_item_id == line.cart_item_id) {
            return Err(CoreError::integrity(format!(
                "cart item {} already backs an order line",
                line.cart_item_id
            )));
        }
        let row = CartOrderItem {
            id: self.state_mut().next_id(),
            order_id: line.order_id,
            client_id: line.client_id,
            cart_item_id: line.cart_item_id,
            total_payed_cents: line.total_payed_cents,
            is_canceled: false,
            is_canceled_by_vendor: false,
            is_active: true,
            created_at: Utc::now(),
        };
        self.state_mut().order_lines.insert(row.id, row.clone());
        Ok(row)
    }

    async fn order_line(&mut self, id: Id) -> CoreResult<Option<CartOrderItem>> {
        Ok(self.state().order_lines.get(&id).cloned())
    }

    async fn order_lines(&mut self, order_id: Id) -> CoreResult<Vec<CartOrderItem>> {
        Ok(self
            .state()
            .order_lines
            .values()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn update_order_line(&mut self, line: &CartOrderItem) -> CoreResult<()> {
        let row = self.state_mut().order_lines.get_mut(&line.id).ok_or_else(|| Self::missing("order line", line.id))?;
        *row = line.clone();
        Ok(())
    }

    async fn count_undelivered_lines_since(&mut self, client_id: Id, since: DateTime<Utc>) -> CoreResult<i64> {
        let orders = &self.state().cart_orders;
        let count = self
            .state()
            .order_lines
            .values()
            .filter(|l| l.client_id == client_id && l.created_at >= since)
            .filter(|l| {
                orders
                    .get(&l.order_id)
                    .map_or(true, |o| o.order_status != OrderStatus::Delivered)
            })
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn insert_claim(&mut self, claim: &NewClaim) -> CoreResult<ClaimedOrder> {
        if self.state_mut().claims.values().any(|c| c.order_id == claim.order_id && !c.is_failed) {
            return Err(CoreError::conflict(format!(
                "order {} already has a live delivery claim",
                claim.order_id
            )));
        }
        let now = Utc::now();
        let row = ClaimedOrder {
            id: self.state_mut().next_id(),
            delivery_agent_id: claim.delivery_agent_id,
            order_id: claim.order_id,
            is_confirmed_by_vendor: false,
            expiration_date_time: claim.expiration_or_default(now),
            is_failed: false,
            delivery_status: DeliveryStatus::Processing,
            is_active: true,
            created_at: now,
        };
        self.state_mut().claims.insert(row.id, row.clone());
        Ok(row)
    }

    async fn claim(&mut self, id: Id) -> CoreResult<Option<ClaimedOrder>> {
        Ok(self.state().claims.get(&id).cloned())
    }

    async fn update_claim(&mut self, claim: &ClaimedOrder) -> CoreResult<()> {
        let row = self.state_mut().claims.get_mut(&claim.id).ok_or_else(|| Self::missing("claim", claim.id))?;
        *row = claim.clone();
        Ok(())
    }

    async fn live_claim_for_order(&mut self, order_id: Id) -> CoreResult<Option<ClaimedOrder>> {
        Ok(self
            .state()
            .claims
            .values()
            .find(|c| c.order_id == order_id && c.is_live())
            .cloned())
    }

    async fn active_claim_for_agent(&mut self, agent_id: Id) -> CoreResult<Option<ClaimedOrder>> {
        Ok(self
            .state()
            .claims
            .values()
            .find(|c| c.delivery_agent_id == agent_id && c.is_active && !c.is_failed)
            .cloned())
    }

    async fn has_failed_claim(&mut self, agent_id: Id, order_id: Id) -> CoreResult<bool> {
        Ok(self
            .state()
            .claims
            .values()
            .any(|c| c.delivery_agent_id == agent_id && c.order_id == order_id && c.is_failed))
    }

    async fn overdue_claims(&mut self, now: DateTime<Utc>) -> CoreResult<Vec<ClaimedOrder>> {
        Ok(self
            .state()
            .claims
            .values()
            .filter(|c| c.is_active && c.is_overdue(now))
            .cloned()
            .collect())
    }

    async fn insert_cancellation_request(
        &mut self,
        claim_id: Id,
        reason: CancellationReason,
    ) -> CoreResult<CancellationRequest> {
        if self.state_mut().cancellation_requests.values().any(|r| r.claimed_order_id == claim_id) {
            return Err(CoreError::conflict(format!(
                "claim {} already has a cancellation request",
                claim_id
            )));
        }
        let row = CancellationRequest {
            id: self.state_mut().next_id(),
            claimed_order_id: claim_id,
            reason,
            is_approved: false,
            is_active: true,
            created_at: Utc::now(),
        };
        self.state_mut().cancellation_requests.insert(row.id, row.clone());
        Ok(row)
    }

    async fn cancellation_request(&mut self, id: Id) -> CoreResult<Option<CancellationRequest>> {
        Ok(self.state().cancellation_requests.get(&id).cloned())
    }

    async fn cancellation_request_for_claim(&mut self, claim_id: Id) -> CoreResult<Option<CancellationRequest>> {
        Ok(self
            .state()
            .cancellation_requests
            .values()
            .find(|r| r.claimed_order_id == claim_id)
            .cloned())
    }

    async fn update_cancellation_request(&mut self, request: &CancellationRequest) -> CoreResult<()> {
        let row = self
            .state_mut()
            .cancellation_requests
            .get_mut(&request.id)
            .ok_or_else(|| Self::missing("cancellation request", request.id))?;
        *row = request.clone();
        Ok(())
    }

    async fn insert_strike(&mut self, strike: &NewStrike) -> CoreResult<Strike> {
        let row = Strike {
            id: self.state_mut().next_id(),
            offender: strike.offender,
            reason: strike.reason.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        self.state_mut().strikes.insert(row.id, row.clone());
        Ok(row)
    }

    async fn strikes_for(&mut self, offender: Offender) -> CoreResult<Vec<Strike>> {
        Ok(self
            .state()
            .strikes
            .values()
            .filter(|s| s.offender == offender)
            .cloned()
            .collect())
    }

    async fn insert_notification(&mut self, notification: &NewNotification) -> CoreResult<Notification> {
        let row = Notification {
            id: self.state_mut().next_id(),
            user_id: notification.user_id,
            message: notification.message.clone(),
            subject: notification.subject,
            category: notification.category,
            is_read: false,
            created_at: Utc::now(),
        };
        self.state_mut().notifications.insert(row.id, row.clone());
        Ok(row)
    }

    async fn notification(&mut self, id: Id) -> CoreResult<Option<Notification>> {
        Ok(self.state().notifications.get(&id).cloned())
    }

    async fn notifications_for_user(&mut self, user_id: Id) -> CoreResult<Vec<Notification>> {
        Ok(self
            .state()
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&mut self, id: Id) -> CoreResult<()> {
        let row = self.state_mut().notifications.get_mut(&id).ok_or_else(|| Self::missing("notification", id))?;
        row.is_read = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let MemoryTx { mut guard, work } = *self;
        if let Some(work) = work {
            *guard = work;
        }
        Ok(())
    }
}
