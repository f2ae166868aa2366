use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;

use lifecycle_core::{
    EngineError, LifecycleEngine, LifecycleStore, MemoryStore, PaymentStatus, PeriodAdvance,
    Periodicity, PlanCatalog, PlanTier, Tenant, TenantStatus,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn tenant(
    id: i64,
    periodicity: Periodicity,
    period_end: NaiveDate,
    payment_status: PaymentStatus,
) -> Tenant {
    let now = Utc::now();
    Tenant {
        id,
        status: TenantStatus::Active,
        payment_status,
        plan_tier: PlanTier::Bronze,
        periodicity,
        period_start: date(2023, 12, 1),
        period_end,
        last_payment_date: None,
        next_payment_date: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn engine(store: &Arc<MemoryStore>) -> LifecycleEngine {
    LifecycleEngine::new(store.clone(), PlanCatalog::builtin()).with_sweep_concurrency(4)
}

#[tokio::test]
async fn paid_tenant_renews_into_a_fresh_period() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant(
        1,
        Periodicity::Monthly,
        date(2024, 1, 1),
        PaymentStatus::Paid,
    ));

    let as_of = date(2024, 1, 2);
    let outcome = engine(&store).run_subscription_sweep(as_of).await.unwrap();
    assert_eq!(outcome.renewed, 1);
    assert_eq!(outcome.suspended, 0);
    assert_eq!(outcome.failed, 0);

    let renewed = store.tenant(1).unwrap();
    assert_eq!(renewed.status, TenantStatus::Active);
    assert_eq!(renewed.period_start, date(2024, 1, 2));
    assert_eq!(renewed.period_end, date(2024, 2, 2));
    assert_eq!(renewed.last_payment_date, Some(date(2024, 1, 2)));
    assert_eq!(renewed.next_payment_date, Some(date(2024, 2, 2)));
}

#[tokio::test]
async fn pending_tenant_is_suspended_and_marked_late() {
    let store = Arc::new(MemoryStore::new());
    let before = tenant(
        2,
        Periodicity::Monthly,
        date(2024, 1, 1),
        PaymentStatus::Pending,
    );
    store.insert_tenant(before.clone());

    let outcome = engine(&store)
        .run_subscription_sweep(date(2024, 1, 2))
        .await
        .unwrap();
    assert_eq!(outcome.suspended, 1);
    assert_eq!(outcome.renewed, 0);

    let suspended = store.tenant(2).unwrap();
    assert_eq!(suspended.status, TenantStatus::Suspended);
    assert_eq!(suspended.payment_status, PaymentStatus::Late);
    assert_eq!(suspended.period_start, before.period_start);
    assert_eq!(suspended.period_end, before.period_end);
    assert_eq!(suspended.last_payment_date, None);
}

#[tokio::test]
async fn already_late_tenant_is_suspended_with_payment_status_preserved() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant(
        3,
        Periodicity::Quarterly,
        date(2024, 1, 1),
        PaymentStatus::Late,
    ));
    store.insert_tenant(tenant(
        4,
        Periodicity::Annual,
        date(2024, 1, 1),
        PaymentStatus::Cancelled,
    ));

    let outcome = engine(&store)
        .run_subscription_sweep(date(2024, 1, 2))
        .await
        .unwrap();
    assert_eq!(outcome.suspended, 2);

    let late = store.tenant(3).unwrap();
    assert_eq!(late.status, TenantStatus::Suspended);
    assert_eq!(late.payment_status, PaymentStatus::Late);

    let cancelled = store.tenant(4).unwrap();
    assert_eq!(cancelled.status, TenantStatus::Suspended);
    assert_eq!(cancelled.payment_status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn tenants_inside_their_period_are_untouched() {
    let store = Arc::new(MemoryStore::new());
    let current = tenant(
        5,
        Periodicity::Monthly,
        date(2024, 3, 1),
        PaymentStatus::Paid,
    );
    store.insert_tenant(current.clone());

    let outcome = engine(&store)
        .run_subscription_sweep(date(2024, 1, 2))
        .await
        .unwrap();
    assert_eq!(outcome.renewed, 0);
    assert_eq!(outcome.suspended, 0);

    let untouched = store.tenant(5).unwrap();
    assert_eq!(untouched.period_end, current.period_end);
    assert_eq!(untouched.version, current.version);
}

#[tokio::test]
async fn sweep_is_idempotent_for_the_same_day() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant(
        6,
        Periodicity::Monthly,
        date(2024, 1, 1),
        PaymentStatus::Paid,
    ));
    store.insert_tenant(tenant(
        7,
        Periodicity::Monthly,
        date(2024, 1, 1),
        PaymentStatus::Pending,
    ));

    let engine = engine(&store);
    let as_of = date(2024, 1, 2);
    let first = engine.run_subscription_sweep(as_of).await.unwrap();
    assert_eq!(first.renewed, 1);
    assert_eq!(first.suspended, 1);

    let renewed = store.tenant(6).unwrap();
    let suspended = store.tenant(7).unwrap();

    let second = engine.run_subscription_sweep(as_of).await.unwrap();
    assert_eq!(second.renewed, 0);
    assert_eq!(second.suspended, 0);

    assert_eq!(store.tenant(6).unwrap().version, renewed.version);
    assert_eq!(store.tenant(7).unwrap().version, suspended.version);
}

#[tokio::test]
async fn cancelled_sweep_leaves_the_remainder_for_the_next_run() {
    let store = Arc::new(MemoryStore::new());
    for id in 1..=20 {
        store.insert_tenant(tenant(
            id,
            Periodicity::Monthly,
            date(2024, 1, 1),
            PaymentStatus::Paid,
        ));
    }

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let outcome = engine(&store)
        .run_subscription_sweep_with_signal(date(2024, 1, 2), rx)
        .await
        .unwrap();
    assert_eq!(outcome.renewed, 0);

    // The follow-up run picks up everything the cancelled pass left behind.
    let resumed = engine(&store)
        .run_subscription_sweep(date(2024, 1, 2))
        .await
        .unwrap();
    assert_eq!(resumed.renewed, 20);
}

#[tokio::test]
async fn versioned_writes_reject_stale_tenants() {
    let store = Arc::new(MemoryStore::new());
    store.insert_tenant(tenant(
        8,
        Periodicity::Monthly,
        date(2024, 1, 1),
        PaymentStatus::Paid,
    ));

    // A concurrent writer bumps the row between read and write.
    store
        .set_tenant_status(8, 1, TenantStatus::Active, PaymentStatus::Paid)
        .await
        .unwrap();

    let stale = store
        .advance_tenant_period(
            8,
            1,
            PeriodAdvance {
                period_start: date(2024, 1, 2),
                period_end: date(2024, 2, 2),
                last_payment_date: date(2024, 1, 2),
                next_payment_date: date(2024, 2, 2),
            },
        )
        .await;
    assert!(matches!(stale, Err(EngineError::StaleWrite { .. })));

    // The row still reflects only the first write.
    let current = store.tenant(8).unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.period_end, date(2024, 1, 1));

    // The sweep retries stale rows on its next pass.
    let outcome = engine(&store)
        .run_subscription_sweep(date(2024, 1, 2))
        .await
        .unwrap();
    assert_eq!(outcome.renewed, 1);
    assert_eq!(store.tenant(8).unwrap().period_end, date(2024, 2, 2));
}
