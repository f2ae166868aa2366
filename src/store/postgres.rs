use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    ComplianceRecord, PaymentStatus, RecordDraft, RecordKind, RecordStatus, SubjectOnboarding,
    Tenant, TenantStatus,
};
use crate::plans::{Quota, ResourceKind};

use super::{LifecycleStore, PeriodAdvance};

/// key: pg-store -> Postgres implementation of the storage contract
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tenant_from_row(row: &PgRow) -> EngineResult<Tenant> {
    Ok(Tenant {
        id: row.get("id"),
        status: row.get::<String, _>("status").parse()?,
        payment_status: row.get::<String, _>("payment_status").parse()?,
        plan_tier: row.get::<String, _>("plan_tier").parse()?,
        periodicity: row.get::<String, _>("periodicity").parse()?,
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        last_payment_date: row.get("last_payment_date"),
        next_payment_date: row.get("next_payment_date"),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn record_from_row(row: &PgRow) -> EngineResult<ComplianceRecord> {
    Ok(ComplianceRecord {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        subject_id: row.get("subject_id"),
        company_id: row.get("company_id"),
        kind: row.get::<String, _>("kind").parse()?,
        issue_date: row.get("issue_date"),
        validity_date: row.get("validity_date"),
        status: row.get::<String, _>("status").parse()?,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// NULL is not usable in a composite primary key, so tenant-wide counters
// store company 0.
fn counter_company(company_id: Option<i64>) -> i64 {
    company_id.unwrap_or(0)
}

#[async_trait]
impl LifecycleStore for PgStore {
    async fn get_tenant(&self, tenant_id: i64) -> EngineResult<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    async fn list_tenants_due_for_sweep(&self, cutoff: NaiveDate) -> EngineResult<Vec<Tenant>> {
        let rows = sqlx::query(
            "SELECT * FROM tenants WHERE status = 'active' AND period_end <= $1 ORDER BY id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(tenant_from_row).collect()
    }

    async fn advance_tenant_period(
        &self,
        tenant_id: i64,
        expected_version: i64,
        advance: PeriodAdvance,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenants SET
                period_start = $3,
                period_end = $4,
                last_payment_date = $5,
                next_payment_date = $6,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(tenant_id)
        .bind(expected_version)
        .bind(advance.period_start)
        .bind(advance.period_end)
        .bind(advance.last_payment_date)
        .bind(advance.next_payment_date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.tenant_write_miss(tenant_id, expected_version).await?);
        }
        Ok(())
    }

    async fn set_tenant_status(
        &self,
        tenant_id: i64,
        expected_version: i64,
        status: TenantStatus,
        payment_status: PaymentStatus,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenants SET
                status = $3,
                payment_status = $4,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(tenant_id)
        .bind(expected_version)
        .bind(status.as_str())
        .bind(payment_status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.tenant_write_miss(tenant_id, expected_version).await?);
        }
        Ok(())
    }

    async fn count_resources(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<i64> {
        let used: Option<i64> = sqlx::query_scalar(
            "SELECT used FROM resource_counters WHERE tenant_id = $1 AND resource_kind = $2 AND company_id = $3",
        )
        .bind(tenant_id)
        .bind(kind.as_str())
        .bind(counter_company(company_id))
        .fetch_optional(&self.pool)
        .await?;
        Ok(used.unwrap_or(0))
    }

    async fn claim_resource_slot(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
        quota: Quota,
    ) -> EngineResult<bool> {
        let ceiling = match quota {
            Quota::Unlimited => i64::MAX,
            Quota::Max(0) => return Ok(false),
            Quota::Max(limit) => limit,
        };

        // Single conditional increment: the insert only happens for a fresh
        // counter, and the update only fires while `used` is below the
        // ceiling, so concurrent claimants cannot overshoot.
        let granted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO resource_counters (tenant_id, resource_kind, company_id, used)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (tenant_id, resource_kind, company_id)
            DO UPDATE SET used = resource_counters.used + 1, updated_at = NOW()
            WHERE resource_counters.used < $4
            RETURNING used
            "#,
        )
        .bind(tenant_id)
        .bind(kind.as_str())
        .bind(counter_company(company_id))
        .bind(ceiling)
        .fetch_optional(&self.pool)
        .await?;

        Ok(granted.is_some())
    }

    async fn release_resource_slot(
        &self,
        tenant_id: i64,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE resource_counters
            SET used = GREATEST(used - 1, 0), updated_at = NOW()
            WHERE tenant_id = $1 AND resource_kind = $2 AND company_id = $3
            "#,
        )
        .bind(tenant_id)
        .bind(kind.as_str())
        .bind(counter_company(company_id))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_admission_record(
        &self,
        tenant_id: i64,
        subject_id: i64,
    ) -> EngineResult<Option<ComplianceRecord>> {
        let row = sqlx::query(
            "SELECT * FROM compliance_records WHERE tenant_id = $1 AND subject_id = $2 AND kind = 'admission'",
        )
        .bind(tenant_id)
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert_compliance_record(&self, draft: RecordDraft) -> EngineResult<ComplianceRecord> {
        let row = if draft.kind == RecordKind::Admission {
            sqlx::query(
                r#"
                INSERT INTO compliance_records (
                    id, tenant_id, subject_id, company_id, kind,
                    issue_date, validity_date, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (tenant_id, subject_id) WHERE kind = 'admission'
                DO UPDATE SET
                    company_id = EXCLUDED.company_id,
                    issue_date = EXCLUDED.issue_date,
                    validity_date = EXCLUDED.validity_date,
                    status = EXCLUDED.status,
                    version = compliance_records.version + 1,
                    updated_at = NOW()
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(draft.tenant_id)
            .bind(draft.subject_id)
            .bind(draft.company_id)
            .bind(draft.kind.as_str())
            .bind(draft.issue_date)
            .bind(draft.validity_date)
            .bind(draft.status.as_str())
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO compliance_records (
                    id, tenant_id, subject_id, company_id, kind,
                    issue_date, validity_date, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(draft.tenant_id)
            .bind(draft.subject_id)
            .bind(draft.company_id)
            .bind(draft.kind.as_str())
            .bind(draft.issue_date)
            .bind(draft.validity_date)
            .bind(draft.status.as_str())
            .fetch_one(&self.pool)
            .await?
        };

        record_from_row(&row)
    }

    async fn list_active_records_expiring_before(
        &self,
        cutoff: NaiveDate,
    ) -> EngineResult<Vec<ComplianceRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM compliance_records WHERE status = 'active' AND validity_date < $1 ORDER BY id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn set_record_status(
        &self,
        record_id: Uuid,
        expected_version: i64,
        status: RecordStatus,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE compliance_records
            SET status = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(record_id)
        .bind(expected_version)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM compliance_records WHERE id = $1)",
            )
            .bind(record_id)
            .fetch_one(&self.pool)
            .await?;
            return Err(if exists {
                EngineError::StaleWrite {
                    entity: "compliance record",
                    id: record_id.to_string(),
                    expected: expected_version,
                }
            } else {
                EngineError::NotFound {
                    entity: "compliance record",
                    id: record_id.to_string(),
                }
            });
        }
        Ok(())
    }

    async fn list_records_for_tenant(
        &self,
        tenant_id: i64,
    ) -> EngineResult<Vec<ComplianceRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM compliance_records WHERE tenant_id = $1 ORDER BY updated_at DESC, validity_date DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn list_subjects_with_onboarding_dates(
        &self,
        tenant_id: i64,
    ) -> EngineResult<Vec<SubjectOnboarding>> {
        let rows = sqlx::query(
            r#"
            SELECT id, company_id, first_exam_date, certificate_valid_until
            FROM subjects
            WHERE tenant_id = $1
              AND first_exam_date IS NOT NULL
              AND certificate_valid_until IS NOT NULL
            ORDER BY id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SubjectOnboarding {
                subject_id: row.get("id"),
                company_id: row.get("company_id"),
                first_exam_date: row.get("first_exam_date"),
                certificate_valid_until: row.get("certificate_valid_until"),
            })
            .collect())
    }

    async fn count_subjects(&self, tenant_id: i64) -> EngineResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subjects WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn refresh_subject_snapshot(&self, tenant_id: i64, subject_id: i64) -> EngineResult<()> {
        sqlx::query(
            r#"
            UPDATE subjects SET
                snapshot_first_issue = stats.first_issue,
                snapshot_latest_validity = stats.latest_validity,
                updated_at = NOW()
            FROM (
                SELECT MIN(issue_date) AS first_issue,
                       MAX(validity_date) AS latest_validity
                FROM compliance_records
                WHERE tenant_id = $1 AND subject_id = $2
            ) AS stats
            WHERE subjects.tenant_id = $1 AND subjects.id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(subject_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl PgStore {
    /// Classify a zero-row versioned update: vanished row vs. stale version.
    async fn tenant_write_miss(
        &self,
        tenant_id: i64,
        expected_version: i64,
    ) -> EngineResult<EngineError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenants WHERE id = $1)")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(if exists {
            EngineError::StaleWrite {
                entity: "tenant",
                id: tenant_id.to_string(),
                expected: expected_version,
            }
        } else {
            EngineError::NotFound {
                entity: "tenant",
                id: tenant_id.to_string(),
            }
        })
    }
}
