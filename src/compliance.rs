use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use futures_util::{future, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{ComplianceRecord, RecordDraft, RecordKind, RecordStatus};
use crate::store::LifecycleStore;

/// A synced admission record plus whether the upsert inserted or overwrote.
#[derive(Debug, Clone)]
pub struct SyncedRecord {
    pub record: ComplianceRecord,
    pub created: bool,
}

/// Upsert the canonical admission record for a subject from its onboarding
/// dates.
///
/// Status is re-derived from `validity_date` against `as_of` on every call,
/// so syncing an expired record with a future validity date brings it back
/// to active. Converges: identical inputs leave exactly one stored record
/// with identical fields.
pub async fn sync_admission_record(
    store: &dyn LifecycleStore,
    tenant_id: i64,
    subject_id: i64,
    company_id: i64,
    issue_date: NaiveDate,
    validity_date: NaiveDate,
    as_of: NaiveDate,
) -> EngineResult<SyncedRecord> {
    let existing = store.find_admission_record(tenant_id, subject_id).await?;
    let status = RecordStatus::derive(validity_date, as_of);

    let record = store
        .upsert_compliance_record(RecordDraft {
            tenant_id,
            subject_id,
            company_id,
            kind: RecordKind::Admission,
            issue_date,
            validity_date,
            status,
        })
        .await?;
    store.refresh_subject_snapshot(tenant_id, subject_id).await?;

    let created = existing.is_none();
    debug!(
        tenant = tenant_id,
        subject = subject_id,
        %status,
        created,
        "synced admission record"
    );
    Ok(SyncedRecord { record, created })
}

/// key: admission-backfill -> per-tenant bulk sync counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackfillOutcome {
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
}

/// Derive admission records for every subject of the tenant whose onboarding
/// dates are both populated. Per-subject failures are logged and counted
/// without aborting the batch.
pub async fn backfill_admission_records(
    store: &dyn LifecycleStore,
    tenant_id: i64,
    as_of: NaiveDate,
    concurrency: usize,
) -> EngineResult<BackfillOutcome> {
    let subjects = store.list_subjects_with_onboarding_dates(tenant_id).await?;
    info!(
        tenant = tenant_id,
        subjects = subjects.len(),
        "backfilling admission records"
    );

    let created = AtomicU64::new(0);
    let updated = AtomicU64::new(0);
    let failed = AtomicU64::new(0);

    futures_util::stream::iter(subjects)
        .for_each_concurrent(concurrency.max(1), |subject| {
            let (created, updated, failed) = (&created, &updated, &failed);
            async move {
                let synced = sync_admission_record(
                    store,
                    tenant_id,
                    subject.subject_id,
                    subject.company_id,
                    subject.first_exam_date,
                    subject.certificate_valid_until,
                    as_of,
                )
                .await;
                match synced {
                    Ok(outcome) if outcome.created => {
                        created.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {
                        updated.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(
                            ?err,
                            tenant = tenant_id,
                            subject = subject.subject_id,
                            "failed to backfill admission record"
                        );
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })
        .await;

    Ok(BackfillOutcome {
        created: created.into_inner(),
        updated: updated.into_inner(),
        failed: failed.into_inner(),
    })
}

/// key: expiration-recalculation -> per-pass transition counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpirationOutcome {
    pub expired: u64,
    pub failed: u64,
}

/// Flip every still-active record whose validity ended before `as_of` to
/// expired. One-directional: nothing here ever moves a record back to
/// active; extending a certificate goes through the admission sync instead.
/// Safe at any cadence; a second run over the same `as_of` transitions zero
/// rows.
pub async fn recompute_expired(
    store: &dyn LifecycleStore,
    as_of: NaiveDate,
    concurrency: usize,
    cancel: watch::Receiver<bool>,
) -> EngineResult<ExpirationOutcome> {
    let lapsed = store.list_active_records_expiring_before(as_of).await?;
    debug!(count = lapsed.len(), %as_of, "expiration pass selected records");

    let expired = AtomicU64::new(0);
    let failed = AtomicU64::new(0);

    futures_util::stream::iter(lapsed)
        .take_while(|_| future::ready(!*cancel.borrow()))
        .for_each_concurrent(concurrency.max(1), |record| {
            let (expired, failed) = (&expired, &failed);
            async move {
                match store
                    .set_record_status(record.id, record.version, RecordStatus::Expired)
                    .await
                {
                    Ok(()) => {
                        expired.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(EngineError::NotFound { .. }) => {
                        warn!(record = %record.id, "record vanished mid-pass, skipping");
                    }
                    Err(err) => {
                        warn!(?err, record = %record.id, "failed to expire record");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        })
        .await;

    Ok(ExpirationOutcome {
        expired: expired.into_inner(),
        failed: failed.into_inner(),
    })
}

/// key: compliance-overview -> tenant-scope aggregation
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceOverview {
    pub total_records: u64,
    pub active_records: u64,
    pub expired_records: u64,
    pub expiring_within_30_days: u64,
    pub expiring_within_5_days: u64,
    pub records_by_kind: HashMap<RecordKind, u64>,
    pub total_subjects: u64,
    pub covered_subjects: u64,
    pub uncovered_subjects: u64,
    pub coverage_percent: f64,
}

/// Pure fold over a tenant's records: status totals, near-expiry windows,
/// per-kind counts, and subject coverage (subjects holding at least one
/// still-valid record).
pub async fn compliance_overview(
    store: &dyn LifecycleStore,
    tenant_id: i64,
    as_of: NaiveDate,
) -> EngineResult<ComplianceOverview> {
    let records = store.list_records_for_tenant(tenant_id).await?;
    let total_subjects = store.count_subjects(tenant_id).await?.max(0) as u64;

    let mut active_records = 0u64;
    let mut expired_records = 0u64;
    let mut expiring_within_30_days = 0u64;
    let mut expiring_within_5_days = 0u64;
    let mut records_by_kind: HashMap<RecordKind, u64> = HashMap::new();
    let mut covered: HashSet<i64> = HashSet::new();

    for record in &records {
        match record.status {
            RecordStatus::Active => active_records += 1,
            RecordStatus::Expired => expired_records += 1,
        }
        *records_by_kind.entry(record.kind).or_insert(0) += 1;

        let days_left = (record.validity_date - as_of).num_days();
        if days_left >= 0 {
            covered.insert(record.subject_id);
            if days_left <= 30 {
                expiring_within_30_days += 1;
            }
            if days_left <= 5 {
                expiring_within_5_days += 1;
            }
        }
    }

    let covered_subjects = covered.len() as u64;
    let uncovered_subjects = total_subjects.saturating_sub(covered_subjects);
    let coverage_percent = if total_subjects > 0 {
        (covered_subjects as f64 / total_subjects as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    Ok(ComplianceOverview {
        total_records: records.len() as u64,
        active_records,
        expired_records,
        expiring_within_30_days,
        expiring_within_5_days,
        records_by_kind,
        total_subjects,
        covered_subjects,
        uncovered_subjects,
        coverage_percent,
    })
}
