use souk_core::identity::Principal;
use souk_core::{CoreError, CoreResult};
use souk_shared::{
    CancellationReason, CancellationRequest, Id, NewNotification, NotificationCategory, OrderStatus,
    Subject, SubjectKind,
};
use tracing::info;

use crate::claims::fail_claim;
use crate::context::{load_claim, load_order, order_vendor, MarketContext};
use crate::manager::{cancel_order_cascade, Canceller};
use crate::outbox::Pending;

/// Delivery agents asking to be released from a claim, and superusers
/// deciding on it.
pub struct CancellationDesk {
    ctx: MarketContext,
}

impl CancellationDesk {
    pub fn new(ctx: MarketContext) -> Self {
        Self { ctx }
    }

    /// File the one request a claim may carry. The claim is frozen from then on.
    pub async fn file_cancellation_request(
        &self,
        principal: &Principal,
        claim_id: Id,
        reason: CancellationReason,
    ) -> CoreResult<CancellationRequest> {
        let agent_id = principal.require_delivery_agent("request a delivery cancellation")?;
        let mut tx = self.ctx.begin().await?;
        let claim = load_claim(tx.as_mut(), claim_id).await?;
        if claim.delivery_agent_id != agent_id {
            return Err(CoreError::permission("you cannot cancel another agent's claim"));
        }
        if claim.is_failed {
            return Err(CoreError::validation("this claim has failed"));
        }
        if !claim.is_active {
            return Err(CoreError::validation("this claim is closed"));
        }

        let request = tx.insert_cancellation_request(claim.id, reason).await?;
        let order = load_order(tx.as_mut(), claim.order_id).await?;
        let vendor = order_vendor(tx.as_mut(), &order).await?;

        let mut pending = Pending::new();
        pending
            .record(
                tx.as_mut(),
                NewNotification::new(
                    vendor.user_id,
                    format!(
                        "The delivery agent asked to cancel the delivery of order #{} ({})",
                        order.id,
                        reason.as_str()
                    ),
                    Subject {
                        kind: SubjectKind::CancellationRequest,
                        id: request.id,
                    },
                    NotificationCategory::ClaimedOrder,
                ),
            )
            .await?;

        self.ctx.finish(tx, pending).await?;
        info!("Agent {} filed cancellation request {} ({})", agent_id, request.id, reason.as_str());
        Ok(request)
    }

    /// Approve once. The reason decides who carries the cancellation.
    pub async fn approve_cancellation_request(
        &self,
        principal: &Principal,
        request_id: Id,
    ) -> CoreResult<CancellationRequest> {
        principal.require_superuser("approve cancellation requests")?;
        let mut tx = self.ctx.begin().await?;
        let mut request = tx
            .cancellation_request(request_id)
            .await?
            .ok_or_else(|| CoreError::not_found("cancellation request", request_id))?;
        if request.is_approved || !request.is_active {
            return Err(CoreError::conflict("this cancellation request is already approved"));
        }

        let mut claim = load_claim(tx.as_mut(), request.claimed_order_id).await?;
        let mut order = load_order(tx.as_mut(), claim.order_id).await?;
        let mut pending = Pending::new();

        match request.reason {
            CancellationReason::Cnr | CancellationReason::Vnr => {
                if !order.is_active || order.order_status == OrderStatus::Delivered {
                    return Err(CoreError::validation(format!(
                        "order #{} can no longer be canceled",
                        order.id
                    )));
                }
                let by = if request.reason == CancellationReason::Cnr {
                    Canceller::Client
                } else {
                    Canceller::Vendor
                };
                cancel_order_cascade(tx.as_mut(), &mut pending, &mut order, by).await?;
            }
            CancellationReason::Anr | CancellationReason::Others => {
                if !claim.is_failed {
                    let vendor = order_vendor(tx.as_mut(), &order).await?;
                    fail_claim(tx.as_mut(), &mut pending, &mut claim, &order, &vendor, false).await?;
                }
            }
        }

        request.is_approved = true;
        request.is_active = false;
        tx.update_cancellation_request(&request).await?;

        if let Some(agent) = tx.delivery_agent(claim.delivery_agent_id).await? {
            pending
                .record(
                    tx.as_mut(),
                    NewNotification::new(
                        agent.user_id,
                        format!("Your cancellation request for order #{} was approved", order.id),
                        Subject::claim(claim.id),
                        NotificationCategory::ClaimedOrder,
                    ),
                )
                .await?;
        }

        self.ctx.finish(tx, pending).await?;
        info!(
            "Approved cancellation request {} ({}) on claim {}",
            request.id,
            request.reason.as_str(),
            claim.id
        );
        Ok(request)
    }
}
