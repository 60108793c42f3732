use chrono::{DateTime, Utc};
use serde::Serialize;
use souk_core::CoreResult;
use souk_shared::Id;
use tracing::{debug, info};

use crate::claims::fail_claim;
use crate::context::{load_order, order_vendor, MarketContext};
use crate::outbox::Pending;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub failed_claims: Vec<Id>,
    pub notifications: usize,
}

/// Fails claims whose pickup window closed without vendor confirmation.
///
/// Safe to run concurrently and repeatedly: claims already failed are never
/// selected again, and rows held by another sweep are skipped.
pub struct ExpirySweeper {
    ctx: MarketContext,
}

impl ExpirySweeper {
    pub fn new(ctx: MarketContext) -> Self {
        Self { ctx }
    }

    pub async fn run_expiry_sweep(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let mut tx = self.ctx.begin().await?;
        let overdue = tx.overdue_claims(now).await?;
        if overdue.is_empty() {
            debug!("Expiry sweep found nothing to fail");
            return Ok(SweepReport::default());
        }

        let mut pending = Pending::new();
        let mut report = SweepReport::default();
        for mut claim in overdue {
            if !claim.is_overdue(now) {
                continue;
            }
            let order = load_order(tx.as_mut(), claim.order_id).await?;
            let vendor = order_vendor(tx.as_mut(), &order).await?;
            fail_claim(tx.as_mut(), &mut pending, &mut claim, &order, &vendor, true).await?;
            report.failed_claims.push(claim.id);
        }
        report.notifications = pending.len();

        self.ctx.finish(tx, pending).await?;
        info!(
            "Expiry sweep failed {} claims: {:?}",
            report.failed_claims.len(),
            report.failed_claims
        );
        Ok(report)
    }
}
