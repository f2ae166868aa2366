use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{
    ComplianceRecord, PaymentStatus, RecordDraft, RecordStatus, SubjectOnboarding, Tenant,
    TenantStatus,
};
use crate::plans::{Quota, ResourceKind};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Fields written together when a renewed tenant's period advances.
#[derive(Debug, Clone, Copy)]
pub struct PeriodAdvance {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub last_payment_date: NaiveDate,
    pub next_payment_date: NaiveDate,
}

/// key: lifecycle-store -> storage collaborator contract
///
/// Every targeted write takes the version the caller read; a mismatch is a
/// `StaleWrite` and leaves the row untouched. Batch jobs depend on that to
/// coexist with ordinary request traffic writing the same rows.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn get_tenant(&self, tenant_id: i64) -> EngineResult<Option<Tenant>>;

    /// Tenants with `status = active` and `period_end <= cutoff`, regardless
    /// of payment status.
    async fn list_tenants_due_for_sweep(&self, cutoff: NaiveDate) -> EngineResult<Vec<Tenant>>;

    async fn advance_tenant_period(
        &self,
        tenant_id: i64,
        expected_version: i64,
        advance: PeriodAdvance,
    ) -> EngineResult<()>;

    async fn set_tenant_status(
        &self,
        tenant_id: i64,
        expected_version: i64,
        status: TenantStatus,
        payment_status: PaymentStatus,
    ) -> EngineResult<()>;

    async fn count_resources(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<i64>;

    /// Atomically admit one more resource under `quota`: increments the
    /// (tenant, kind, company) counter iff it is still below the ceiling.
    /// Returns whether the slot was granted. This is the race-free
    /// alternative to count-then-decide-then-insert.
    async fn claim_resource_slot(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
        quota: Quota,
    ) -> EngineResult<bool>;

    async fn release_resource_slot(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<()>;

    async fn find_admission_record(
        &self,
        tenant_id: i64,
        subject_id: i64,
    ) -> EngineResult<Option<ComplianceRecord>>;

    /// Insert or overwrite. Admission drafts are keyed on (tenant, subject):
    /// at most one stored row, updated in place. Other kinds always insert a
    /// new historical instance.
    async fn upsert_compliance_record(&self, draft: RecordDraft) -> EngineResult<ComplianceRecord>;

    /// Records with `status = active` and `validity_date < cutoff`.
    async fn list_active_records_expiring_before(
        &self,
        cutoff: NaiveDate,
    ) -> EngineResult<Vec<ComplianceRecord>>;

    async fn set_record_status(
        &self,
        record_id: Uuid,
        expected_version: i64,
        status: RecordStatus,
    ) -> EngineResult<()>;

    async fn list_records_for_tenant(&self, tenant_id: i64)
        -> EngineResult<Vec<ComplianceRecord>>;

    /// Subject rows with both onboarding dates populated; incomplete rows
    /// are not returned.
    async fn list_subjects_with_onboarding_dates(
        &self,
        tenant_id: i64,
    ) -> EngineResult<Vec<SubjectOnboarding>>;

    async fn count_subjects(&self, tenant_id: i64) -> EngineResult<i64>;

    /// Recompute the subject row's denormalized certificate pair (earliest
    /// issue date, latest validity date) from its stored records.
    async fn refresh_subject_snapshot(&self, tenant_id: i64, subject_id: i64) -> EngineResult<()>;
}
