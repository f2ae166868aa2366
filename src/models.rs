use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::periods::Periodicity;
use crate::plans::PlanTier;

/// key: tenant-model -> subscription account
///
/// `version` is the optimistic-concurrency token: every targeted write names
/// the version it read and bumps it by one on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub status: TenantStatus,
    pub payment_status: PaymentStatus,
    pub plan_tier: PlanTier,
    pub periodicity: Periodicity,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub last_payment_date: Option<NaiveDate>,
    pub next_payment_date: Option<NaiveDate>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Cancelled,
}

impl TenantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            "cancelled" => Ok(TenantStatus::Cancelled),
            other => Err(EngineError::configuration(format!(
                "unknown tenant status {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Pending,
    Late,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Late => "late",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "paid" => Ok(PaymentStatus::Paid),
            "pending" => Ok(PaymentStatus::Pending),
            "late" => Ok(PaymentStatus::Late),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(EngineError::configuration(format!(
                "unknown payment status {other:?}"
            ))),
        }
    }
}

/// key: compliance-record -> time-bounded certificate for a subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub id: Uuid,
    pub tenant_id: i64,
    pub subject_id: i64,
    pub company_id: i64,
    pub kind: RecordKind,
    pub issue_date: NaiveDate,
    pub validity_date: NaiveDate,
    pub status: RecordStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Certificate kinds. `Admission` is upsert-unique per (tenant, subject);
/// the other kinds keep their historical instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Admission,
    Periodic,
    ReturnToWork,
    FunctionChange,
    Termination,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Admission => "admission",
            RecordKind::Periodic => "periodic",
            RecordKind::ReturnToWork => "return_to_work",
            RecordKind::FunctionChange => "function_change",
            RecordKind::Termination => "termination",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admission" => Ok(RecordKind::Admission),
            "periodic" => Ok(RecordKind::Periodic),
            "return_to_work" => Ok(RecordKind::ReturnToWork),
            "function_change" => Ok(RecordKind::FunctionChange),
            "termination" => Ok(RecordKind::Termination),
            other => Err(EngineError::configuration(format!(
                "unknown record kind {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Expired,
}

impl RecordStatus {
    /// Status a record carries given its validity date and the current date.
    /// A record expiring today is still active today.
    pub fn derive(validity_date: NaiveDate, as_of: NaiveDate) -> Self {
        if validity_date >= as_of {
            RecordStatus::Active
        } else {
            RecordStatus::Expired
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(RecordStatus::Active),
            "expired" => Ok(RecordStatus::Expired),
            other => Err(EngineError::configuration(format!(
                "unknown record status {other:?}"
            ))),
        }
    }
}

/// Field set for a record upsert; the store assigns id, version, and audit
/// timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDraft {
    pub tenant_id: i64,
    pub subject_id: i64,
    pub company_id: i64,
    pub kind: RecordKind,
    pub issue_date: NaiveDate,
    pub validity_date: NaiveDate,
    pub status: RecordStatus,
}

/// A subject row whose onboarding fields are complete enough to derive an
/// admission record from.
#[derive(Debug, Clone)]
pub struct SubjectOnboarding {
    pub subject_id: i64,
    pub company_id: i64,
    pub first_exam_date: NaiveDate,
    pub certificate_valid_until: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::RecordStatus;
    use chrono::NaiveDate;

    #[test]
    fn record_expiring_today_is_still_active() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(RecordStatus::derive(today, today), RecordStatus::Active);
        assert_eq!(
            RecordStatus::derive(today.pred_opt().unwrap(), today),
            RecordStatus::Expired
        );
        assert_eq!(
            RecordStatus::derive(today.succ_opt().unwrap(), today),
            RecordStatus::Active
        );
    }
}
