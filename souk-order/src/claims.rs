use chrono::{DateTime, Utc};
use souk_core::identity::Principal;
use souk_core::repository::MarketTx;
use souk_core::{CoreError, CoreResult};
use souk_shared::{
    CartOrder, ClaimedOrder, DeliveryStatus, Id, NewClaim, NewNotification, NewStrike,
    NotificationCategory, Offender, OrderStatus, Subject, VendorProfile,
};
use tracing::info;

use crate::cart::load_client;
use crate::context::{load_claim, load_order, order_vendor, MarketContext};
use crate::manager::broadcast_available;
use crate::outbox::Pending;

/// Arbitrates exclusive, time-boxed delivery claims.
pub struct ClaimArbiter {
    ctx: MarketContext,
}

impl ClaimArbiter {
    pub fn new(ctx: MarketContext) -> Self {
        Self { ctx }
    }

    pub async fn claim_order(&self, principal: &Principal, order_id: Id, now: DateTime<Utc>) -> CoreResult<ClaimedOrder> {
        let agent_id = principal.require_delivery_agent("claim orders")?;
        let mut tx = self.ctx.begin().await?;

        let agent = tx
            .delivery_agent(agent_id)
            .await?
            .ok_or_else(|| CoreError::not_found("delivery agent", agent_id))?;
        if agent.is_banned {
            return Err(CoreError::validation("banned delivery agents cannot claim orders"));
        }

        let order = load_order(tx.as_mut(), order_id).await?;
        ensure_claimable(&order)?;
        let vendor = order_vendor(tx.as_mut(), &order).await?;
        if agent.city != vendor.city {
            return Err(CoreError::validation("you can only claim orders from vendors in your city"));
        }
        if tx.has_failed_claim(agent_id, order_id).await? {
            return Err(CoreError::validation("you already failed to deliver this order"));
        }
        if let Some(current) = tx.active_claim_for_agent(agent_id).await? {
            return Err(CoreError::validation(format!(
                "finish your active claim #{} before taking another",
                current.id
            )));
        }
        if tx.live_claim_for_order(order_id).await?.is_some() {
            return Err(CoreError::conflict("this order is already claimed"));
        }

        // The partial unique index decides any race that got past the read above.
        let claim = tx
            .insert_claim(&NewClaim {
                delivery_agent_id: agent_id,
                order_id,
                expiration_date_time: Some(now + self.ctx.rules.claim_window()),
            })
            .await?;

        let client = load_client(tx.as_mut(), order.client_id).await?;
        let mut pending = Pending::new();
        for (user_id, message) in [
            (client.user_id, format!("A delivery agent is on the way for your order #{}", order.id)),
            (vendor.user_id, format!("{} will pick up order #{}", agent.full_name, order.id)),
            (
                agent.user_id,
                format!(
                    "You claimed order #{}, pick it up before {}",
                    order.id,
                    claim.expiration_date_time.format("%H:%M")
                ),
            ),
        ] {
            pending
                .record(
                    tx.as_mut(),
                    NewNotification::new(user_id, message, Subject::claim(claim.id), NotificationCategory::ClaimedOrder),
                )
                .await?;
        }

        self.ctx.finish(tx, pending).await?;
        info!("Agent {} claimed order {} as claim {}", agent_id, order_id, claim.id);
        Ok(claim)
    }

    /// Vendor attests that the agent physically picked the goods up.
    pub async fn confirm_pickup(&self, principal: &Principal, claim_id: Id, now: DateTime<Utc>) -> CoreResult<ClaimedOrder> {
        let vendor_id = principal.require_vendor("confirm a pickup")?;
        let mut tx = self.ctx.begin().await?;
        let mut claim = load_claim(tx.as_mut(), claim_id).await?;
        let mut order = load_order(tx.as_mut(), claim.order_id).await?;
        if order.vendor_id != Some(vendor_id) {
            return Err(CoreError::permission("you cannot confirm pickup of another vendor's order"));
        }
        ensure_claim_open(tx.as_mut(), &claim, &order).await?;
        if claim.is_confirmed_by_vendor {
            return Err(CoreError::conflict("pickup is already confirmed"));
        }
        if now >= claim.expiration_date_time {
            return Err(CoreError::validation("this claim has expired"));
        }

        claim.is_confirmed_by_vendor = true;
        let mut pending = Pending::new();
        if claim.delivery_status == DeliveryStatus::Delivered {
            complete_delivery(tx.as_mut(), &mut pending, &mut claim, &mut order).await?;
        } else {
            tx.update_claim(&claim).await?;
        }

        if let Some(agent) = tx.delivery_agent(claim.delivery_agent_id).await? {
            pending
                .record(
                    tx.as_mut(),
                    NewNotification::new(
                        agent.user_id,
                        format!("The vendor confirmed your pickup of order #{}", order.id),
                        Subject::claim(claim.id),
                        NotificationCategory::ClaimedOrder,
                    ),
                )
                .await?;
        }

        self.ctx.finish(tx, pending).await?;
        info!("Vendor {} confirmed pickup for claim {}", vendor_id, claim.id);
        Ok(claim)
    }

    /// Agent moves the delivery forward. Closing the order needs the vendor's
    /// pickup confirmation; without it the status is stored and nothing else.
    pub async fn update_delivery_status(
        &self,
        principal: &Principal,
        claim_id: Id,
        status: DeliveryStatus,
    ) -> CoreResult<ClaimedOrder> {
        let agent_id = principal.require_delivery_agent("update a delivery")?;
        let mut tx = self.ctx.begin().await?;
        let mut claim = load_claim(tx.as_mut(), claim_id).await?;
        if claim.delivery_agent_id != agent_id {
            return Err(CoreError::permission("you cannot update another agent's claim"));
        }
        let mut order = load_order(tx.as_mut(), claim.order_id).await?;
        ensure_claim_open(tx.as_mut(), &claim, &order).await?;
        check_delivery_step(claim.delivery_status, status)?;

        let mut pending = Pending::new();
        claim.delivery_status = status;
        match status {
            DeliveryStatus::Delivered if claim.is_confirmed_by_vendor => {
                complete_delivery(tx.as_mut(), &mut pending, &mut claim, &mut order).await?;
            }
            DeliveryStatus::Returned => {
                // A returned claim gives the order back: it stops counting as
                // the order's claim and the other agents of the city are told.
                claim.is_failed = true;
                claim.is_active = false;
                tx.update_claim(&claim).await?;
                let vendor = order_vendor(tx.as_mut(), &order).await?;
                pending
                    .record(
                        tx.as_mut(),
                        NewNotification::new(
                            vendor.user_id,
                            format!("Order #{} is being returned to you", order.id),
                            Subject::claim(claim.id),
                            NotificationCategory::ClaimedOrder,
                        ),
                    )
                    .await?;
                if order.is_claimable() {
                    broadcast_available(tx.as_mut(), &mut pending, &order, &vendor, Some(claim.delivery_agent_id))
                        .await?;
                }
            }
            _ => {
                tx.update_claim(&claim).await?;
                if status == DeliveryStatus::Delivered {
                    info!("Claim {} marked delivered before pickup confirmation, order {} left open", claim.id, order.id);
                }
            }
        }

        self.ctx.finish(tx, pending).await?;
        info!("Agent {} set claim {} to {}", agent_id, claim.id, status.as_str());
        Ok(claim)
    }
}

fn ensure_claimable(order: &CartOrder) -> CoreResult<()> {
    if !order.is_active || order.is_canceled {
        return Err(CoreError::validation(format!("order #{} is canceled", order.id)));
    }
    if order.order_status != OrderStatus::Confirmed {
        return Err(CoreError::validation(format!(
            "order #{} is {}, only confirmed orders can be claimed",
            order.id,
            order.order_status.as_str()
        )));
    }
    if !order.delivery_option {
        return Err(CoreError::validation(format!("order #{} does not require delivery", order.id)));
    }
    Ok(())
}

/// Rejects any update to a claim that is failed, frozen by a cancellation
/// request or closed, and to claims on canceled or delivered orders.
async fn ensure_claim_open(tx: &mut dyn MarketTx, claim: &ClaimedOrder, order: &CartOrder) -> CoreResult<()> {
    if claim.is_failed {
        return Err(CoreError::validation("this claim has failed"));
    }
    if !order.is_active || order.is_canceled || order.order_status == OrderStatus::Canceled {
        return Err(CoreError::validation(format!("order #{} is canceled", order.id)));
    }
    if tx.cancellation_request_for_claim(claim.id).await?.is_some() {
        return Err(CoreError::validation("this claim has a cancellation request"));
    }
    if order.order_status == OrderStatus::Delivered {
        return Err(CoreError::validation("this order is already delivered"));
    }
    if !claim.is_active {
        return Err(CoreError::validation("this claim is closed"));
    }
    Ok(())
}

fn check_delivery_step(from: DeliveryStatus, to: DeliveryStatus) -> CoreResult<()> {
    if from == DeliveryStatus::Delivered {
        return Err(CoreError::validation("this delivery is already marked delivered"));
    }
    match (from.progress(), to) {
        (_, DeliveryStatus::Canceled) => Err(CoreError::validation(
            "file a cancellation request to cancel a delivery",
        )),
        (_, DeliveryStatus::Returned) => Ok(()),
        (Some(current), next) if next.progress().is_some_and(|p| p > current) => Ok(()),
        _ => Err(CoreError::validation(format!(
            "delivery status cannot move from {} to {}",
            from.as_str(),
            to.as_str()
        ))),
    }
}

/// Close the order behind a delivered, vendor-confirmed claim.
async fn complete_delivery(
    tx: &mut dyn MarketTx,
    pending: &mut Pending,
    claim: &mut ClaimedOrder,
    order: &mut CartOrder,
) -> CoreResult<()> {
    claim.is_active = false;
    tx.update_claim(claim).await?;
    order.order_status = OrderStatus::Delivered;
    tx.update_cart_order(order).await?;

    let client = load_client(tx, order.client_id).await?;
    pending
        .record(
            tx,
            NewNotification::new(
                client.user_id,
                format!("Your order #{} has been delivered", order.id),
                Subject::cart_order(order.id),
                NotificationCategory::Order,
            ),
        )
        .await?;
    info!("Order {} delivered through claim {}", order.id, claim.id);
    Ok(())
}

/// Fail a claim and reopen its order to the other agents of the city.
pub(crate) async fn fail_claim(
    tx: &mut dyn MarketTx,
    pending: &mut Pending,
    claim: &mut ClaimedOrder,
    order: &CartOrder,
    vendor: &VendorProfile,
    with_strike: bool,
) -> CoreResult<()> {
    claim.is_failed = true;
    claim.is_active = false;
    tx.update_claim(claim).await?;

    let agent = tx.delivery_agent(claim.delivery_agent_id).await?;
    if with_strike {
        tx.insert_strike(&NewStrike::new(
            Offender::DeliveryAgent(claim.delivery_agent_id),
            format!("failed to pick up order #{} in time", order.id),
        ))
        .await?;
        if let Some(agent) = &agent {
            pending
                .record(
                    tx,
                    NewNotification::new(
                        agent.user_id,
                        format!("You failed to deliver order #{} in time and received a strike", order.id),
                        Subject::claim(claim.id),
                        NotificationCategory::ClaimedOrder,
                    ),
                )
                .await?;
        }
    }
    pending
        .record(
            tx,
            NewNotification::new(
                vendor.user_id,
                format!("The delivery agent failed to reach you for order #{}", order.id),
                Subject::claim(claim.id),
                NotificationCategory::ClaimedOrder,
            ),
        )
        .await?;

    if order.is_claimable() {
        broadcast_available(tx, pending, order, vendor, Some(claim.delivery_agent_id)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_steps_only_move_forward() {
        use DeliveryStatus::*;
        assert!(check_delivery_step(Processing, ClaimedFromVendor).is_ok());
        assert!(check_delivery_step(Processing, Delivered).is_ok());
        assert!(check_delivery_step(OnTheWay, ClaimedFromVendor).is_err());
        assert!(check_delivery_step(OnTheWay, OnTheWay).is_err());
        assert!(check_delivery_step(OnTheWay, Returned).is_ok());
        assert!(check_delivery_step(Delivered, Returned).is_err());
    }

    #[test]
    fn test_agents_cannot_cancel_directly() {
        let err = check_delivery_step(DeliveryStatus::Processing, DeliveryStatus::Canceled).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }
}
