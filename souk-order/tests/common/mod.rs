#![allow(dead_code)]

use chrono::{DateTime, Utc};
use souk_catalog::StockItem;
use souk_core::identity::{Principal, Role};
use souk_core::notify::LogNotificationSink;
use souk_core::repository::MarketStore;
use souk_core::rules::BusinessRules;
use souk_order::{
    CancellationDesk, CartService, CheckoutReceipt, CheckoutRequest, CheckoutSplitter, ClaimArbiter,
    ExpirySweeper, Inbox, MarketContext, OrderManager,
};
use souk_shared::{
    ClientProfile, DeliveryAgentProfile, Notification, Offender, ProductRef, Strike, VendorProfile,
};
use souk_store::MemoryStore;
use std::sync::Arc;

pub const CITY: &str = "Rabat";

pub struct Market {
    pub store: MemoryStore,
    pub cart: CartService,
    pub checkout: CheckoutSplitter,
    pub orders: OrderManager,
    pub claims: ClaimArbiter,
    pub sweeper: ExpirySweeper,
    pub desk: CancellationDesk,
    pub inbox: Inbox,
}

impl Market {
    pub fn new() -> Self {
        Self::with_rules(BusinessRules::default())
    }

    pub fn with_rules(rules: BusinessRules) -> Self {
        let store = MemoryStore::new();
        let ctx = MarketContext::new(Arc::new(store.clone()), Arc::new(LogNotificationSink), rules);
        Self {
            store,
            cart: CartService::new(ctx.clone()),
            checkout: CheckoutSplitter::new(ctx.clone()),
            orders: OrderManager::new(ctx.clone()),
            claims: ClaimArbiter::new(ctx.clone()),
            sweeper: ExpirySweeper::new(ctx.clone()),
            desk: CancellationDesk::new(ctx.clone()),
            inbox: Inbox::new(ctx),
        }
    }

    pub async fn client(&self, name: &str, city: &str) -> (ClientProfile, Principal) {
        let (profile, _cart) = self.store.seed_client(name, city).await;
        let principal = Principal::new(profile.user_id, Role::Client(profile.id));
        (profile, principal)
    }

    pub async fn vendor(&self, name: &str, city: &str) -> (VendorProfile, Principal) {
        let profile = self.store.seed_vendor(name, city).await;
        let principal = Principal::new(profile.user_id, Role::Vendor(profile.id));
        (profile, principal)
    }

    pub async fn agent(&self, name: &str, city: &str) -> (DeliveryAgentProfile, Principal) {
        let profile = self.store.seed_delivery_agent(name, city).await;
        let principal = Principal::new(profile.user_id, Role::DeliveryAgent(profile.id));
        (profile, principal)
    }

    pub async fn stock(&self, product: ProductRef) -> StockItem {
        let mut tx = self.store.begin().await.unwrap();
        tx.stock_item(product).await.unwrap().unwrap()
    }

    pub async fn strikes(&self, offender: Offender) -> Vec<Strike> {
        let mut tx = self.store.begin().await.unwrap();
        tx.strikes_for(offender).await.unwrap()
    }

    pub async fn notifications(&self, user_id: i64) -> Vec<Notification> {
        let mut tx = self.store.begin().await.unwrap();
        tx.notifications_for_user(user_id).await.unwrap()
    }

    /// One vendor, one product, one client who checks out `quantity` units
    /// with delivery requested.
    pub async fn single_order(&self, stock: i32, quantity: i32) -> SingleOrder {
        let (vendor, vendor_p) = self.vendor("Atlas Crafts", CITY).await;
        let (client, client_p) = self.client("Salma", CITY).await;
        let product = self.store.seed_product(vendor.id, "Rug", 5000, stock).await;
        let product = ProductRef::Physical(product.id);
        self.cart.add_cart_item(&client_p, product, quantity, None).await.unwrap();
        let receipt = self.checkout.checkout(&client_p, delivery_request(), Utc::now()).await.unwrap();
        let order_id = receipt.orders[0].order.id;
        SingleOrder {
            vendor,
            vendor_p,
            client,
            client_p,
            product,
            receipt,
            order_id,
        }
    }
}

pub struct SingleOrder {
    pub vendor: VendorProfile,
    pub vendor_p: Principal,
    pub client: ClientProfile,
    pub client_p: Principal,
    pub product: ProductRef,
    pub receipt: CheckoutReceipt,
    pub order_id: i64,
}

pub fn delivery_request() -> CheckoutRequest {
    CheckoutRequest {
        address: "12 Avenue Mohammed V".to_string(),
        city: CITY.to_string(),
        country: "Morocco".to_string(),
        payment_method: Default::default(),
        delivery_option: true,
    }
}

pub fn superuser() -> Principal {
    Principal::new(1, Role::Superuser)
}

pub fn after_window(now: DateTime<Utc>) -> DateTime<Utc> {
    now + chrono::Duration::seconds(BusinessRules::default().claim_window_seconds + 1)
}
