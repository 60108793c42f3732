mod common;

use chrono::Utc;
use common::{after_window, superuser, Market, CITY};
use souk_core::CoreError;
use souk_shared::{CancellationReason, DeliveryStatus, Offender, OrderStatus};
use std::sync::Arc;

#[tokio::test]
async fn test_second_agent_cannot_claim_a_claimed_order() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (agent_a, a) = market.agent("Karim", CITY).await;
    let (_, b) = market.agent("Nadia", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();

    let claim = market.claims.claim_order(&a, order.order_id, Utc::now()).await.unwrap();
    assert_eq!(claim.delivery_agent_id, agent_a.id);
    assert_eq!(claim.delivery_status, DeliveryStatus::Processing);

    let err = market.claims.claim_order(&b, order.order_id, Utc::now()).await.unwrap_err();
    assert_eq!(err, CoreError::conflict("this order is already claimed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let market = Arc::new(Market::new());
    let order = market.single_order(10, 1).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();

    let mut agents = Vec::new();
    for name in ["Karim", "Nadia", "Yassine", "Imane", "Hamza", "Sara"] {
        agents.push(market.agent(name, CITY).await.1);
    }

    let mut handles = Vec::new();
    for agent in agents {
        let market = market.clone();
        let order_id = order.order_id;
        handles.push(tokio::spawn(async move {
            market.claims.claim_order(&agent, order_id, Utc::now()).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(matches!(err, CoreError::Conflict(_))),
        }
    }
    assert_eq!(winners, 1);
    let live: Vec<_> = market
        .store
        .claims_for_order(order.order_id)
        .await
        .into_iter()
        .filter(|c| !c.is_failed)
        .collect();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
async fn test_claim_eligibility() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (_, local) = market.agent("Karim", CITY).await;
    let (_, remote) = market.agent("Nadia", "Tangier").await;

    let err = market.claims.claim_order(&local, order.order_id, Utc::now()).await.unwrap_err();
    assert!(matches!(&err, CoreError::ValidationError(msg) if msg.contains("only confirmed orders")));

    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let err = market.claims.claim_order(&remote, order.order_id, Utc::now()).await.unwrap_err();
    assert_eq!(err, CoreError::validation("you can only claim orders from vendors in your city"));

    let err = market.claims.claim_order(&order.client_p, order.order_id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));
}

#[tokio::test]
async fn test_agent_holds_one_active_claim() {
    let market = Market::new();
    let first = market.single_order(10, 1).await;
    let second = market.single_order(10, 1).await;
    let (_, agent) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&first.vendor_p, first.order_id).await.unwrap();
    market.orders.confirm_order(&second.vendor_p, second.order_id).await.unwrap();

    market.claims.claim_order(&agent, first.order_id, Utc::now()).await.unwrap();
    let err = market.claims.claim_order(&agent, second.order_id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}

#[tokio::test]
async fn test_confirmation_broadcast_reaches_city_agents() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (local, _) = market.agent("Karim", CITY).await;
    let (remote, _) = market.agent("Nadia", "Tangier").await;

    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();

    let local_inbox = market.notifications(local.user_id).await;
    assert_eq!(local_inbox.len(), 1);
    assert!(local_inbox[0].message.contains("ready to be claimed"));
    assert!(market.notifications(remote.user_id).await.is_empty());
}

#[tokio::test]
async fn test_delivery_needs_vendor_confirmation() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (_, agent) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let claim = market.claims.claim_order(&agent, order.order_id, Utc::now()).await.unwrap();

    let claim = market
        .claims
        .update_delivery_status(&agent, claim.id, DeliveryStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(claim.delivery_status, DeliveryStatus::Delivered);
    assert!(claim.is_active);
    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert_eq!(details.order.order_status, OrderStatus::Confirmed);

    let claim = market.claims.confirm_pickup(&order.vendor_p, claim.id, Utc::now()).await.unwrap();
    assert!(claim.is_confirmed_by_vendor);
    assert!(!claim.is_active);
    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert_eq!(details.order.order_status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_full_delivery_path() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (_, agent) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let claim = market.claims.claim_order(&agent, order.order_id, Utc::now()).await.unwrap();
    market.claims.confirm_pickup(&order.vendor_p, claim.id, Utc::now()).await.unwrap();

    let err = market.claims.confirm_pickup(&order.vendor_p, claim.id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    for status in [DeliveryStatus::ClaimedFromVendor, DeliveryStatus::OnTheWay] {
        market.claims.update_delivery_status(&agent, claim.id, status).await.unwrap();
    }
    let err = market
        .claims
        .update_delivery_status(&agent, claim.id, DeliveryStatus::ClaimedFromVendor)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    let done = market
        .claims
        .update_delivery_status(&agent, claim.id, DeliveryStatus::Delivered)
        .await
        .unwrap();
    assert!(!done.is_active);

    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert_eq!(details.order.order_status, OrderStatus::Delivered);
    let err = market
        .claims
        .update_delivery_status(&agent, claim.id, DeliveryStatus::Returned)
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::validation("this order is already delivered"));
    let err = market.orders.cancel_order_by_client(&order.client_p, order.order_id).await.unwrap_err();
    assert_eq!(err, CoreError::validation("you cannot update a delivered order"));
}

#[tokio::test]
async fn test_client_cannot_cancel_claimed_order() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (_, agent) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    market.claims.claim_order(&agent, order.order_id, Utc::now()).await.unwrap();

    let err = market.orders.cancel_order_by_client(&order.client_p, order.order_id).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
    assert_eq!(market.stock(order.product).await.quantity, 9);
}

#[tokio::test]
async fn test_expiry_sweep_fails_and_reopens() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (agent_a, a) = market.agent("Karim", CITY).await;
    let (agent_b, b) = market.agent("Nadia", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let now = Utc::now();
    let claim = market.claims.claim_order(&a, order.order_id, now).await.unwrap();
    let b_before = market.notifications(agent_b.user_id).await.len();

    let report = market.sweeper.run_expiry_sweep(after_window(now)).await.unwrap();

    assert_eq!(report.failed_claims, vec![claim.id]);
    let stored = &market.store.claims_for_order(order.order_id).await[0];
    assert!(stored.is_failed);
    assert!(!stored.is_active);
    assert_eq!(market.strikes(Offender::DeliveryAgent(agent_a.id)).await.len(), 1);
    let b_inbox = market.notifications(agent_b.user_id).await;
    assert_eq!(b_inbox.len(), b_before + 1);
    assert!(b_inbox.last().unwrap().message.contains("ready to be claimed"));
    let vendor_inbox = market.notifications(order.vendor.user_id).await;
    assert!(vendor_inbox.iter().any(|n| n.message.contains("failed to reach you")));

    // Running again changes nothing.
    let total_before = market.notifications(agent_b.user_id).await.len();
    let again = market.sweeper.run_expiry_sweep(after_window(now)).await.unwrap();
    assert!(again.failed_claims.is_empty());
    assert_eq!(market.strikes(Offender::DeliveryAgent(agent_a.id)).await.len(), 1);
    assert_eq!(market.notifications(agent_b.user_id).await.len(), total_before);

    // The failed agent is banned from this order; another agent may take it.
    let err = market.claims.claim_order(&a, order.order_id, Utc::now()).await.unwrap_err();
    assert_eq!(err, CoreError::validation("you already failed to deliver this order"));
    market.claims.claim_order(&b, order.order_id, Utc::now()).await.unwrap();
}

#[tokio::test]
async fn test_sweep_spares_confirmed_and_fresh_claims() {
    let market = Market::new();
    let confirmed = market.single_order(10, 1).await;
    let fresh = market.single_order(10, 1).await;
    let (_, a) = market.agent("Karim", CITY).await;
    let (_, b) = market.agent("Nadia", CITY).await;
    let now = Utc::now();
    market.orders.confirm_order(&confirmed.vendor_p, confirmed.order_id).await.unwrap();
    market.orders.confirm_order(&fresh.vendor_p, fresh.order_id).await.unwrap();

    let picked = market.claims.claim_order(&a, confirmed.order_id, now).await.unwrap();
    market.claims.confirm_pickup(&confirmed.vendor_p, picked.id, now).await.unwrap();
    let later = now + chrono::Duration::hours(1);
    market.claims.claim_order(&b, fresh.order_id, later).await.unwrap();

    let report = market.sweeper.run_expiry_sweep(after_window(now)).await.unwrap();
    assert!(report.failed_claims.is_empty());
}

#[tokio::test]
async fn test_late_pickup_confirmation_rejected() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (_, agent) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let now = Utc::now();
    let claim = market.claims.claim_order(&agent, order.order_id, now).await.unwrap();

    let err = market
        .claims
        .confirm_pickup(&order.vendor_p, claim.id, after_window(now))
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::validation("this claim has expired"));

    market.sweeper.run_expiry_sweep(after_window(now)).await.unwrap();
    let err = market.claims.confirm_pickup(&order.vendor_p, claim.id, now).await.unwrap_err();
    assert_eq!(err, CoreError::validation("this claim has failed"));
}

#[tokio::test]
async fn test_vendor_cancel_closes_claim() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (agent, agent_p) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let claim = market.claims.claim_order(&agent_p, order.order_id, Utc::now()).await.unwrap();

    // Confirmed orders are frozen for the vendor; the cancellation goes
    // through the agent's request instead.
    let err = market.orders.cancel_order_by_vendor(&order.vendor_p, order.order_id).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    let request = market
        .desk
        .file_cancellation_request(&agent_p, claim.id, CancellationReason::Vnr)
        .await
        .unwrap();
    market.desk.approve_cancellation_request(&superuser(), request.id).await.unwrap();

    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert_eq!(details.order.order_status, OrderStatus::Canceled);
    assert!(details.lines.iter().all(|l| l.is_canceled_by_vendor && !l.is_active));
    assert_eq!(market.stock(order.product).await.quantity, 10);
    let stored = &market.store.claims_for_order(order.order_id).await[0];
    assert_eq!(stored.delivery_status, DeliveryStatus::Canceled);
    assert!(!stored.is_active);
    assert!(!stored.is_failed);
    assert!(market.strikes(Offender::DeliveryAgent(agent.id)).await.is_empty());
}

#[tokio::test]
async fn test_returned_claim_gives_the_order_back() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (agent_a, a) = market.agent("Karim", CITY).await;
    let (agent_b, b) = market.agent("Nadia", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let now = Utc::now();
    let claim = market.claims.claim_order(&a, order.order_id, now).await.unwrap();
    let b_before = market.notifications(agent_b.user_id).await.len();

    let returned = market
        .claims
        .update_delivery_status(&a, claim.id, DeliveryStatus::Returned)
        .await
        .unwrap();
    assert_eq!(returned.delivery_status, DeliveryStatus::Returned);
    assert!(returned.is_failed);
    assert!(!returned.is_active);
    assert!(market.strikes(Offender::DeliveryAgent(agent_a.id)).await.is_empty());
    let b_inbox = market.notifications(agent_b.user_id).await;
    assert_eq!(b_inbox.len(), b_before + 1);
    assert!(b_inbox.last().unwrap().message.contains("ready to be claimed"));

    let report = market.sweeper.run_expiry_sweep(after_window(now)).await.unwrap();
    assert!(report.failed_claims.is_empty());

    let err = market.claims.claim_order(&a, order.order_id, Utc::now()).await.unwrap_err();
    assert_eq!(err, CoreError::validation("you already failed to deliver this order"));
    let second = market.claims.claim_order(&b, order.order_id, Utc::now()).await.unwrap();
    assert_eq!(second.delivery_agent_id, agent_b.id);
}

#[tokio::test]
async fn test_unconfirmed_delivery_still_blocks_client_cancel() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (_, agent) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let claim = market.claims.claim_order(&agent, order.order_id, Utc::now()).await.unwrap();
    market
        .claims
        .update_delivery_status(&agent, claim.id, DeliveryStatus::Delivered)
        .await
        .unwrap();

    let err = market.orders.cancel_order_by_client(&order.client_p, order.order_id).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert!(details.order.is_active);
    assert_eq!(details.order.order_status, OrderStatus::Confirmed);
    assert_eq!(market.stock(order.product).await.quantity, 9);

    let done = market.claims.confirm_pickup(&order.vendor_p, claim.id, Utc::now()).await.unwrap();
    assert!(!done.is_active);
    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert_eq!(details.order.order_status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_pickup_on_canceled_order_rejected() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (agent, agent_p) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let claim = market.claims.claim_order(&agent_p, order.order_id, Utc::now()).await.unwrap();
    market
        .claims
        .update_delivery_status(&agent_p, claim.id, DeliveryStatus::Delivered)
        .await
        .unwrap();

    let request = market
        .desk
        .file_cancellation_request(&agent_p, claim.id, CancellationReason::Vnr)
        .await
        .unwrap();
    market.desk.approve_cancellation_request(&superuser(), request.id).await.unwrap();

    let stored = &market.store.claims_for_order(order.order_id).await[0];
    assert_eq!(stored.delivery_status, DeliveryStatus::Canceled);
    assert!(!stored.is_active);

    let err = market.claims.confirm_pickup(&order.vendor_p, claim.id, Utc::now()).await.unwrap_err();
    assert_eq!(err, CoreError::validation(format!("order #{} is canceled", order.order_id)));
    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert_eq!(details.order.order_status, OrderStatus::Canceled);
    assert!(!market.store.claims_for_order(order.order_id).await[0].is_confirmed_by_vendor);

    // The closed claim no longer holds the agent.
    let next = market.single_order(10, 1).await;
    market.orders.confirm_order(&next.vendor_p, next.order_id).await.unwrap();
    let again = market.claims.claim_order(&agent_p, next.order_id, Utc::now()).await.unwrap();
    assert_eq!(again.delivery_agent_id, agent.id);
}

#[tokio::test]
async fn test_client_unreachable_request_cancels_for_client() {
    let market = Market::new();
    let order = market.single_order(10, 2).await;
    let (_, agent) = market.agent("Karim", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let claim = market.claims.claim_order(&agent, order.order_id, Utc::now()).await.unwrap();

    let request = market
        .desk
        .file_cancellation_request(&agent, claim.id, CancellationReason::Cnr)
        .await
        .unwrap();

    // The claim is frozen while the request is pending.
    let err = market
        .claims
        .update_delivery_status(&agent, claim.id, DeliveryStatus::OnTheWay)
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::validation("this claim has a cancellation request"));
    let err = market
        .desk
        .file_cancellation_request(&agent, claim.id, CancellationReason::Others)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let err = market.desk.approve_cancellation_request(&order.vendor_p, request.id).await.unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)));

    let approved = market.desk.approve_cancellation_request(&superuser(), request.id).await.unwrap();
    assert!(approved.is_approved);
    assert!(!approved.is_active);

    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert!(details.order.is_canceled);
    assert!(!details.order.is_active);
    assert_eq!(market.stock(order.product).await.quantity, 10);
    assert_eq!(market.strikes(Offender::Client(order.client.id)).await.len(), 1);

    let err = market.desk.approve_cancellation_request(&superuser(), request.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn test_agent_unreachable_request_reopens_without_strike() {
    let market = Market::new();
    let order = market.single_order(10, 1).await;
    let (karim, a) = market.agent("Karim", CITY).await;
    let (_, b) = market.agent("Nadia", CITY).await;
    market.orders.confirm_order(&order.vendor_p, order.order_id).await.unwrap();
    let claim = market.claims.claim_order(&a, order.order_id, Utc::now()).await.unwrap();

    let request = market
        .desk
        .file_cancellation_request(&a, claim.id, CancellationReason::Anr)
        .await
        .unwrap();
    market.desk.approve_cancellation_request(&superuser(), request.id).await.unwrap();

    let stored = &market.store.claims_for_order(order.order_id).await[0];
    assert!(stored.is_failed);
    assert!(market.strikes(Offender::DeliveryAgent(karim.id)).await.is_empty());
    let details = market.orders.order(&order.client_p, order.order_id).await.unwrap();
    assert!(details.order.is_active);
    market.claims.claim_order(&b, order.order_id, Utc::now()).await.unwrap();
}
