use chrono::Utc;
use citybite_order::OrderService;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::metrics::Metrics;

/// Periodic settlement of every wallet whose interval has elapsed.
pub fn start_settlement_worker(service: OrderService, metrics: Arc<Metrics>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Settlement worker started, sweeping every {:?}", every);

        loop {
            ticker.tick().await;
            match service.sweep_settlements(Utc::now()).await {
                Ok(report) => {
                    metrics.settlements.with_label_values(&["settled"]).inc_by(report.settled as u64);
                    metrics.settlements.with_label_values(&["skipped"]).inc_by(report.skipped as u64);
                }
                Err(e) => error!("Settlement sweep failed: {}", e),
            }
        }
    })
}

/// Re-expires orders left at `placed` past their window, e.g. when the
/// process restarted while their timers were pending.
pub fn start_expiry_worker(service: OrderService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Expiry worker started, sweeping every {:?}", every);

        loop {
            ticker.tick().await;
            if let Err(e) = service.expire_stale_orders(Utc::now()).await {
                error!("Stale order sweep failed: {}", e);
            }
        }
    })
}
