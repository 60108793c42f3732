use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use souk_api::{app, auth::issue_token, AppState, AuthConfig};
use souk_core::identity::{Principal, Role};
use souk_core::notify::LogNotificationSink;
use souk_core::rules::BusinessRules;
use souk_order::MarketContext;
use souk_store::MemoryStore;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";
const CITY: &str = "Marrakesh";

struct Harness {
    router: Router,
    store: MemoryStore,
    auth: AuthConfig,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::new();
        let market = MarketContext::new(
            Arc::new(store.clone()),
            Arc::new(LogNotificationSink),
            BusinessRules::default(),
        );
        let auth = AuthConfig {
            secret: SECRET.to_string(),
            expiration: 3600,
        };
        let router = app(AppState::new(market, None, auth.clone()));
        Self { router, store, auth }
    }

    fn token(&self, principal: &Principal) -> String {
        issue_token(&self.auth, principal).unwrap()
    }

    async fn client(&self, name: &str) -> String {
        let (profile, _) = self.store.seed_client(name, CITY).await;
        self.token(&Principal::new(profile.user_id, Role::Client(profile.id)))
    }

    async fn vendor(&self, name: &str) -> (i64, String) {
        let profile = self.store.seed_vendor(name, CITY).await;
        (profile.id, self.token(&Principal::new(profile.user_id, Role::Vendor(profile.id))))
    }

    async fn agent(&self, name: &str) -> String {
        let profile = self.store.seed_delivery_agent(name, CITY).await;
        self.token(&Principal::new(profile.user_id, Role::DeliveryAgent(profile.id)))
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Client puts one rug in the cart and checks out with delivery.
    async fn placed_order(&self, stock: i32) -> PlacedOrder {
        let (vendor_id, vendor) = self.vendor("Atlas Crafts").await;
        let client = self.client("Salma").await;
        let rug = self.store.seed_product(vendor_id, "Rug", 5000, stock).await;

        let (status, _) = self
            .call(
                Method::POST,
                "/v1/cart/items",
                Some(&client),
                Some(json!({ "product": { "kind": "physical", "id": rug.id }, "quantity": 1 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, receipt) = self
            .call(Method::POST, "/v1/checkout", Some(&client), Some(checkout_body()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let order_id = receipt["orders"][0]["order"]["id"].as_i64().unwrap();
        PlacedOrder {
            client,
            vendor,
            order_id,
            receipt,
        }
    }
}

struct PlacedOrder {
    client: String,
    vendor: String,
    order_id: i64,
    receipt: Value,
}

fn checkout_body() -> Value {
    json!({
        "address": "3 Derb Sidi Bouloukat",
        "city": CITY,
        "country": "Morocco",
        "delivery_option": true
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let harness = Harness::new();
    let (status, body) = harness.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_need_a_valid_token() {
    let harness = Harness::new();

    let (status, body) = harness.call(Method::GET, "/v1/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = harness.call(Method::GET, "/v1/cart", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let foreign = AuthConfig {
        secret: "someone-else".to_string(),
        expiration: 3600,
    };
    let forged = issue_token(&foreign, &Principal::new(1, Role::Superuser)).unwrap();
    let (status, _) = harness.call(Method::POST, "/v1/admin/sweep", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_checkout_then_vendor_confirms_once() {
    let harness = Harness::new();
    let placed = harness.placed_order(3).await;

    assert_eq!(placed.receipt["global_order"]["total_price_cents"], 7000);
    assert_eq!(placed.receipt["orders"][0]["order"]["order_status"], "processing");

    let (status, cart) = harness.call(Method::GET, "/v1/cart", Some(&placed.client), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart.as_array().unwrap().len(), 0);

    let status_uri = format!("/v1/orders/{}/status", placed.order_id);
    let confirm = json!({ "status": "confirmed" });
    let (status, order) = harness
        .call(Method::PATCH, &status_uri, Some(&placed.vendor), Some(confirm.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["order_status"], "confirmed");

    let (status, _) = harness
        .call(Method::PATCH, &status_uri, Some(&placed.vendor), Some(confirm))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, details) = harness
        .call(Method::GET, &format!("/v1/orders/{}", placed.order_id), Some(&placed.client), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["lines"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_wrong_role_is_forbidden() {
    let harness = Harness::new();
    let placed = harness.placed_order(3).await;

    let (status, body) = harness
        .call(
            Method::PATCH,
            &format!("/v1/orders/{}/status", placed.order_id),
            Some(&placed.client),
            Some(json!({ "status": "confirmed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "only vendors can change an order status");

    let (status, _) = harness.call(Method::POST, "/v1/admin/sweep", Some(&placed.vendor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_empty_checkout_is_a_bad_request() {
    let harness = Harness::new();
    let client = harness.client("Youssef").await;
    let (status, body) = harness
        .call(Method::POST, "/v1/checkout", Some(&client), Some(checkout_body()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "your shopping cart is empty");
}

#[tokio::test]
async fn test_second_claim_on_an_order_conflicts() {
    let harness = Harness::new();
    let placed = harness.placed_order(3).await;
    let first = harness.agent("Karim").await;
    let second = harness.agent("Nadia").await;

    let (status, _) = harness
        .call(
            Method::PATCH,
            &format!("/v1/orders/{}/status", placed.order_id),
            Some(&placed.vendor),
            Some(json!({ "status": "confirmed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let claim_uri = format!("/v1/orders/{}/claim", placed.order_id);
    let (status, claim) = harness.call(Method::POST, &claim_uri, Some(&first), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(claim["delivery_status"], "processing");

    let (status, _) = harness.call(Method::POST, &claim_uri, Some(&second), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = harness
        .call(
            Method::POST,
            &format!("/v1/orders/{}/cancel", placed.order_id),
            Some(&placed.client),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notifications_are_private_and_markable() {
    let harness = Harness::new();
    let placed = harness.placed_order(3).await;

    let (status, inbox) = harness.call(Method::GET, "/v1/notifications", Some(&placed.vendor), None).await;
    assert_eq!(status, StatusCode::OK);
    let notifications = inbox.as_array().unwrap();
    assert!(!notifications.is_empty());
    let id = notifications[0]["id"].as_i64().unwrap();

    let read_uri = format!("/v1/notifications/{}/read", id);
    let (status, _) = harness.call(Method::POST, &read_uri, Some(&placed.client), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness.call(Method::POST, &read_uri, Some(&placed.vendor), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, inbox) = harness.call(Method::GET, "/v1/notifications", Some(&placed.vendor), None).await;
    let read = inbox.as_array().unwrap().iter().find(|n| n["id"] == id).unwrap();
    assert_eq!(read["is_read"], true);
}

#[tokio::test]
async fn test_superuser_can_trigger_the_sweep() {
    let harness = Harness::new();
    let admin = harness.token(&Principal::new(1, Role::Superuser));
    let (status, report) = harness.call(Method::POST, "/v1/admin/sweep", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["failed_claims"].as_array().unwrap().len(), 0);
    assert_eq!(report["notifications"], 0);
}
