use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;
use tokio::time::{self, Duration as TokioDuration};
use tracing::{info, warn};

use crate::config;
use crate::engine::LifecycleEngine;
use crate::error::EngineResult;

/// Stop signal for the spawned loop. Dropping the handle also stops it.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
}

impl SchedulerHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// key: lifecycle-scheduler -> recurring batch automation
///
/// Ticks on `SWEEP_SCAN_INTERVAL_SECS` and runs both batch entry points with
/// `as_of = today`. Both are idempotent within the same day, so a tick that
/// overlaps an operator-triggered run is harmless.
pub fn spawn(engine: Arc<LifecycleEngine>) -> SchedulerHandle {
    let interval = TokioDuration::from_secs(*config::SWEEP_SCAN_INTERVAL_SECS);
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        let mut shutdown = rx;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let today = Utc::now().date_naive();
                    if let Err(err) = process_tick(&engine, today, shutdown.clone()).await {
                        warn!(?err, "lifecycle automation tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("lifecycle scheduler stopping");
                        break;
                    }
                }
            }
        }
    });

    SchedulerHandle { shutdown: tx }
}

/// One tick: subscription sweep, then expiration recalculation. Exposed so
/// operator tooling can trigger the same pass on demand.
pub async fn process_tick(
    engine: &LifecycleEngine,
    as_of: NaiveDate,
    cancel: watch::Receiver<bool>,
) -> EngineResult<()> {
    let sweep = engine
        .run_subscription_sweep_with_signal(as_of, cancel.clone())
        .await?;
    info!(
        renewed = sweep.renewed,
        suspended = sweep.suspended,
        skipped = sweep.skipped,
        failed = sweep.failed,
        "subscription sweep finished"
    );

    let expirations = engine
        .run_expiration_recalculation_with_signal(as_of, cancel)
        .await?;
    info!(
        expired = expirations.expired,
        failed = expirations.failed,
        "expiration recalculation finished"
    );

    Ok(())
}
