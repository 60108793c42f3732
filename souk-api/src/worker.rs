use chrono::Utc;
use souk_order::ExpirySweeper;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Runs the claim expiry sweep forever, once per `every`.
pub async fn start_expiry_worker(sweeper: ExpirySweeper, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Expiry worker started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        match sweeper.run_expiry_sweep(Utc::now()).await {
            Ok(report) if !report.failed_claims.is_empty() => {
                info!("Expiry worker failed claims {:?}", report.failed_claims);
            }
            Ok(_) => {}
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}
