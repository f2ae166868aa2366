use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    ComplianceRecord, PaymentStatus, RecordDraft, RecordKind, RecordStatus, SubjectOnboarding,
    Tenant, TenantStatus,
};
use crate::plans::{Quota, ResourceKind};

use super::{LifecycleStore, PeriodAdvance};

/// key: memory-store -> in-process fixture implementation
///
/// Map-backed store with the same contract semantics as the Postgres
/// implementation, including version checks and atomic slot claims. Used by
/// the test suites and handy for demos; not meant to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tenants: DashMap<i64, Tenant>,
    records: DashMap<Uuid, ComplianceRecord>,
    admission_index: DashMap<(i64, i64), Uuid>,
    counters: DashMap<(i64, ResourceKind, Option<i64>), i64>,
    subjects: DashMap<(i64, i64), SubjectRow>,
    poisoned_subjects: DashSet<i64>,
}

#[derive(Debug, Clone)]
struct SubjectRow {
    company_id: i64,
    first_exam_date: Option<NaiveDate>,
    certificate_valid_until: Option<NaiveDate>,
    snapshot_first_issue: Option<NaiveDate>,
    snapshot_latest_validity: Option<NaiveDate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }

    pub fn tenant(&self, tenant_id: i64) -> Option<Tenant> {
        self.tenants.get(&tenant_id).map(|entry| entry.value().clone())
    }

    pub fn insert_subject(
        &self,
        tenant_id: i64,
        subject_id: i64,
        company_id: i64,
        first_exam_date: Option<NaiveDate>,
        certificate_valid_until: Option<NaiveDate>,
    ) {
        self.subjects.insert(
            (tenant_id, subject_id),
            SubjectRow {
                company_id,
                first_exam_date,
                certificate_valid_until,
                snapshot_first_issue: None,
                snapshot_latest_validity: None,
            },
        );
    }

    pub fn record(&self, record_id: Uuid) -> Option<ComplianceRecord> {
        self.records.get(&record_id).map(|entry| entry.value().clone())
    }

    /// Denormalized (earliest issue, latest validity) pair for a subject.
    pub fn subject_snapshot(
        &self,
        tenant_id: i64,
        subject_id: i64,
    ) -> Option<(Option<NaiveDate>, Option<NaiveDate>)> {
        self.subjects
            .get(&(tenant_id, subject_id))
            .map(|row| (row.snapshot_first_issue, row.snapshot_latest_validity))
    }

    /// Test hook: make every upsert for this subject fail with a storage
    /// error, to exercise per-row failure isolation in batch passes.
    pub fn poison_subject(&self, subject_id: i64) {
        self.poisoned_subjects.insert(subject_id);
    }
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    async fn get_tenant(&self, tenant_id: i64) -> EngineResult<Option<Tenant>> {
        Ok(self.tenants.get(&tenant_id).map(|entry| entry.value().clone()))
    }

    async fn list_tenants_due_for_sweep(&self, cutoff: NaiveDate) -> EngineResult<Vec<Tenant>> {
        let mut due: Vec<Tenant> = self
            .tenants
            .iter()
            .filter(|entry| {
                entry.status == TenantStatus::Active && entry.period_end <= cutoff
            })
            .map(|entry| entry.value().clone())
            .collect();
        due.sort_by_key(|tenant| tenant.id);
        Ok(due)
    }

    async fn advance_tenant_period(
        &self,
        tenant_id: i64,
        expected_version: i64,
        advance: PeriodAdvance,
    ) -> EngineResult<()> {
        let mut entry = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or(EngineError::NotFound {
                entity: "tenant",
                id: tenant_id.to_string(),
            })?;
        if entry.version != expected_version {
            return Err(EngineError::StaleWrite {
                entity: "tenant",
                id: tenant_id.to_string(),
                expected: expected_version,
            });
        }
        entry.period_start = advance.period_start;
        entry.period_end = advance.period_end;
        entry.last_payment_date = Some(advance.last_payment_date);
        entry.next_payment_date = Some(advance.next_payment_date);
        entry.version += 1;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn set_tenant_status(
        &self,
        tenant_id: i64,
        expected_version: i64,
        status: TenantStatus,
        payment_status: PaymentStatus,
    ) -> EngineResult<()> {
        let mut entry = self
            .tenants
            .get_mut(&tenant_id)
            .ok_or(EngineError::NotFound {
                entity: "tenant",
                id: tenant_id.to_string(),
            })?;
        if entry.version != expected_version {
            return Err(EngineError::StaleWrite {
                entity: "tenant",
                id: tenant_id.to_string(),
                expected: expected_version,
            });
        }
        entry.status = status;
        entry.payment_status = payment_status;
        entry.version += 1;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn count_resources(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<i64> {
        Ok(self
            .counters
            .get(&(tenant_id, kind, company_id))
            .map(|entry| *entry)
            .unwrap_or(0))
    }

    async fn claim_resource_slot(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
        quota: Quota,
    ) -> EngineResult<bool> {
        // The entry guard serializes concurrent claims on the same key.
        let mut entry = self
            .counters
            .entry((tenant_id, kind, company_id))
            .or_insert(0);
        if quota.admits(*entry) {
            *entry += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_resource_slot(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<()> {
        let mut entry = self
            .counters
            .entry((tenant_id, kind, company_id))
            .or_insert(0);
        if *entry > 0 {
            *entry -= 1;
        }
        Ok(())
    }

    async fn find_admission_record(
        &self,
        tenant_id: i64,
        subject_id: i64,
    ) -> EngineResult<Option<ComplianceRecord>> {
        let record = self
            .admission_index
            .get(&(tenant_id, subject_id))
            .and_then(|id| self.records.get(&id).map(|entry| entry.value().clone()));
        Ok(record)
    }

    async fn upsert_compliance_record(&self, draft: RecordDraft) -> EngineResult<ComplianceRecord> {
        if self.poisoned_subjects.contains(&draft.subject_id) {
            return Err(EngineError::Storage(anyhow::anyhow!(
                "injected failure for subject {}",
                draft.subject_id
            )));
        }

        let now = Utc::now();
        if draft.kind == RecordKind::Admission {
            let key = (draft.tenant_id, draft.subject_id);
            if let Some(existing_id) = self.admission_index.get(&key).map(|id| *id) {
                let mut entry =
                    self.records
                        .get_mut(&existing_id)
                        .ok_or(EngineError::NotFound {
                            entity: "compliance record",
                            id: existing_id.to_string(),
                        })?;
                entry.company_id = draft.company_id;
                entry.issue_date = draft.issue_date;
                entry.validity_date = draft.validity_date;
                entry.status = draft.status;
                entry.version += 1;
                entry.updated_at = now;
                return Ok(entry.clone());
            }
        }

        let record = ComplianceRecord {
            id: Uuid::new_v4(),
            tenant_id: draft.tenant_id,
            subject_id: draft.subject_id,
            company_id: draft.company_id,
            kind: draft.kind,
            issue_date: draft.issue_date,
            validity_date: draft.validity_date,
            status: draft.status,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        if record.kind == RecordKind::Admission {
            self.admission_index
                .insert((record.tenant_id, record.subject_id), record.id);
        }
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_active_records_expiring_before(
        &self,
        cutoff: NaiveDate,
    ) -> EngineResult<Vec<ComplianceRecord>> {
        let mut expiring: Vec<ComplianceRecord> = self
            .records
            .iter()
            .filter(|entry| entry.status == RecordStatus::Active && entry.validity_date < cutoff)
            .map(|entry| entry.value().clone())
            .collect();
        expiring.sort_by_key(|record| record.id);
        Ok(expiring)
    }

    async fn set_record_status(
        &self,
        record_id: Uuid,
        expected_version: i64,
        status: RecordStatus,
    ) -> EngineResult<()> {
        let mut entry = self
            .records
            .get_mut(&record_id)
            .ok_or(EngineError::NotFound {
                entity: "compliance record",
                id: record_id.to_string(),
            })?;
        if entry.version != expected_version {
            return Err(EngineError::StaleWrite {
                entity: "compliance record",
                id: record_id.to_string(),
                expected: expected_version,
            });
        }
        entry.status = status;
        entry.version += 1;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn list_records_for_tenant(
        &self,
        tenant_id: i64,
    ) -> EngineResult<Vec<ComplianceRecord>> {
        let mut records: Vec<ComplianceRecord> = self
            .records
            .iter()
            .filter(|entry| entry.tenant_id == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    async fn list_subjects_with_onboarding_dates(
        &self,
        tenant_id: i64,
    ) -> EngineResult<Vec<SubjectOnboarding>> {
        let mut onboarded: Vec<SubjectOnboarding> = self
            .subjects
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .filter_map(|entry| {
                let (first_exam_date, certificate_valid_until) = match (
                    entry.first_exam_date,
                    entry.certificate_valid_until,
                ) {
                    (Some(exam), Some(valid)) => (exam, valid),
                    _ => return None,
                };
                Some(SubjectOnboarding {
                    subject_id: entry.key().1,
                    company_id: entry.company_id,
                    first_exam_date,
                    certificate_valid_until,
                })
            })
            .collect();
        onboarded.sort_by_key(|subject| subject.subject_id);
        Ok(onboarded)
    }

    async fn count_subjects(&self, tenant_id: i64) -> EngineResult<i64> {
        Ok(self
            .subjects
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .count() as i64)
    }

    async fn refresh_subject_snapshot(&self, tenant_id: i64, subject_id: i64) -> EngineResult<()> {
        let mut first_issue: Option<NaiveDate> = None;
        let mut latest_validity: Option<NaiveDate> = None;
        for entry in self.records.iter() {
            if entry.tenant_id != tenant_id || entry.subject_id != subject_id {
                continue;
            }
            first_issue = Some(match first_issue {
                Some(current) => current.min(entry.issue_date),
                None => entry.issue_date,
            });
            latest_validity = Some(match latest_validity {
                Some(current) => current.max(entry.validity_date),
                None => entry.validity_date,
            });
        }

        if let Some(mut row) = self.subjects.get_mut(&(tenant_id, subject_id)) {
            row.snapshot_first_issue = first_issue;
            row.snapshot_latest_validity = latest_validity;
        }
        Ok(())
    }
}
