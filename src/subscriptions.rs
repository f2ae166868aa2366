use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use futures_util::{future, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{PaymentStatus, Tenant, TenantStatus};
use crate::periods::period_end;
use crate::store::{LifecycleStore, PeriodAdvance};

/// key: subscription-sweep -> per-tick renewal/suspension counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub renewed: u64,
    pub suspended: u64,
    pub skipped: u64,
    pub failed: u64,
}

enum Transition {
    Renewed,
    Suspended,
    Skipped,
}

/// One sweep over every active tenant whose period has elapsed as of `as_of`.
///
/// Rows are processed independently under `concurrency`; per-row failures
/// are logged and counted, never fatal to the pass. Re-running with the same
/// `as_of` is a no-op for already-advanced tenants: renewal moves
/// `period_end` past the cutoff and suspension removes the row from the
/// eligible set.
pub async fn run_subscription_sweep(
    store: &dyn LifecycleStore,
    as_of: NaiveDate,
    concurrency: usize,
    cancel: watch::Receiver<bool>,
) -> EngineResult<SweepOutcome> {
    let due = store.list_tenants_due_for_sweep(as_of).await?;
    debug!(count = due.len(), %as_of, "subscription sweep selected tenants");

    let renewed = AtomicU64::new(0);
    let suspended = AtomicU64::new(0);
    let skipped = AtomicU64::new(0);
    let failed = AtomicU64::new(0);

    futures_util::stream::iter(due)
        .take_while(|_| future::ready(!*cancel.borrow()))
        .for_each_concurrent(concurrency.max(1), |tenant| {
            let (renewed, suspended, skipped, failed) = (&renewed, &suspended, &skipped, &failed);
            async move {
                match sweep_tenant(store, &tenant, as_of).await {
                    Ok(Transition::Renewed) => {
                        renewed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Transition::Suspended) => {
                        suspended.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Transition::Skipped) => {
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::NotFound { .. }) => {
                        warn!(tenant = tenant.id, "tenant vanished mid-sweep, skipping");
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(?err, tenant = tenant.id, "failed to sweep tenant");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })
        .await;

    Ok(SweepOutcome {
        renewed: renewed.into_inner(),
        suspended: suspended.into_inner(),
        skipped: skipped.into_inner(),
        failed: failed.into_inner(),
    })
}

async fn sweep_tenant(
    store: &dyn LifecycleStore,
    tenant: &Tenant,
    as_of: NaiveDate,
) -> EngineResult<Transition> {
    match (tenant.status, tenant.payment_status) {
        (TenantStatus::Active, PaymentStatus::Paid) => {
            let next_end = period_end(tenant.periodicity, as_of);
            store
                .advance_tenant_period(
                    tenant.id,
                    tenant.version,
                    PeriodAdvance {
                        period_start: as_of,
                        period_end: next_end,
                        last_payment_date: as_of,
                        next_payment_date: next_end,
                    },
                )
                .await?;
            info!(tenant = tenant.id, until = %next_end, "renewed subscription");
            Ok(Transition::Renewed)
        }
        (TenantStatus::Active, PaymentStatus::Pending) => {
            store
                .set_tenant_status(
                    tenant.id,
                    tenant.version,
                    TenantStatus::Suspended,
                    PaymentStatus::Late,
                )
                .await?;
            info!(tenant = tenant.id, "suspended subscription for missed payment");
            Ok(Transition::Suspended)
        }
        // A tenant can sit at late/cancelled payment while still active if
        // payment state was set out of band. Suspend it rather than let the
        // stale period linger; the payment status is left as recorded.
        (TenantStatus::Active, payment @ (PaymentStatus::Late | PaymentStatus::Cancelled)) => {
            store
                .set_tenant_status(tenant.id, tenant.version, TenantStatus::Suspended, payment)
                .await?;
            info!(
                tenant = tenant.id,
                payment = %payment,
                "suspended subscription already past due"
            );
            Ok(Transition::Suspended)
        }
        // Suspended and cancelled tenants have no automatic outgoing
        // transition; reactivation is an administrative write.
        (status, _) => {
            debug!(tenant = tenant.id, %status, "tenant not eligible for sweep transition");
            Ok(Transition::Skipped)
        }
    }
}
