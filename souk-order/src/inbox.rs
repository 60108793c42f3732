use souk_core::identity::{Principal, Role};
use souk_core::{CoreError, CoreResult};
use souk_shared::{Id, Notification, Offender, Strike};

use crate::context::MarketContext;
use crate::outbox::Pending;

/// Read side of notifications and strikes, scoped to the caller.
pub struct Inbox {
    ctx: MarketContext,
}

impl Inbox {
    pub fn new(ctx: MarketContext) -> Self {
        Self { ctx }
    }

    pub async fn list_notifications(&self, principal: &Principal) -> CoreResult<Vec<Notification>> {
        let mut tx = self.ctx.begin().await?;
        tx.notifications_for_user(principal.user_id).await
    }

    pub async fn mark_notification_read(&self, principal: &Principal, notification_id: Id) -> CoreResult<()> {
        let mut tx = self.ctx.begin().await?;
        let notification = tx
            .notification(notification_id)
            .await?
            .ok_or_else(|| CoreError::not_found("notification", notification_id))?;
        if notification.user_id != principal.user_id {
            return Err(CoreError::permission("you can only read your own notifications"));
        }
        if !notification.is_read {
            tx.mark_notification_read(notification_id).await?;
        }
        self.ctx.finish(tx, Pending::new()).await
    }

    pub async fn list_strikes(&self, principal: &Principal) -> CoreResult<Vec<Strike>> {
        let offender = match principal.role {
            Role::Client(id) => Offender::Client(id),
            Role::Vendor(id) => Offender::Vendor(id),
            Role::DeliveryAgent(id) => Offender::DeliveryAgent(id),
            Role::Superuser => return Ok(Vec::new()),
        };
        let mut tx = self.ctx.begin().await?;
        tx.strikes_for(offender).await
    }
}
