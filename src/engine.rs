use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::watch;

use crate::compliance::{self, BackfillOutcome, ComplianceOverview, ExpirationOutcome};
use crate::config;
use crate::error::{EngineError, EngineResult};
use crate::models::ComplianceRecord;
use crate::plans::{Feature, PlanCatalog, PlanTier, ResourceKind};
use crate::scope::TenantScope;
use crate::store::LifecycleStore;
use crate::subscriptions::{self, SweepOutcome};

/// key: lifecycle-engine -> invocation surface over the storage collaborator
///
/// Holds the immutable plan catalog and the store handle; every entry point
/// the scheduler, admin tooling, and resource-creation endpoints use lives
/// here. Batch entry points are idempotent within the same `as_of`.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn LifecycleStore>,
    plans: PlanCatalog,
    sweep_concurrency: usize,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn LifecycleStore>, plans: PlanCatalog) -> Self {
        Self {
            store,
            plans,
            sweep_concurrency: *config::SWEEP_CONCURRENCY,
        }
    }

    pub fn with_sweep_concurrency(mut self, concurrency: usize) -> Self {
        self.sweep_concurrency = concurrency.max(1);
        self
    }

    pub fn plans(&self) -> &PlanCatalog {
        &self.plans
    }

    pub fn store(&self) -> &Arc<dyn LifecycleStore> {
        &self.store
    }

    pub async fn run_subscription_sweep(&self, as_of: NaiveDate) -> EngineResult<SweepOutcome> {
        let (_keep_alive, cancel) = watch::channel(false);
        self.run_subscription_sweep_with_signal(as_of, cancel).await
    }

    /// Sweep variant taking a cancellation signal; flipping the watch value
    /// to `true` stops scheduling further rows. Already-written rows stand,
    /// and the next run picks up the remainder.
    pub async fn run_subscription_sweep_with_signal(
        &self,
        as_of: NaiveDate,
        cancel: watch::Receiver<bool>,
    ) -> EngineResult<SweepOutcome> {
        subscriptions::run_subscription_sweep(
            self.store.as_ref(),
            as_of,
            self.sweep_concurrency,
            cancel,
        )
        .await
    }

    pub async fn run_expiration_recalculation(
        &self,
        as_of: NaiveDate,
    ) -> EngineResult<ExpirationOutcome> {
        let (_keep_alive, cancel) = watch::channel(false);
        self.run_expiration_recalculation_with_signal(as_of, cancel)
            .await
    }

    pub async fn run_expiration_recalculation_with_signal(
        &self,
        as_of: NaiveDate,
        cancel: watch::Receiver<bool>,
    ) -> EngineResult<ExpirationOutcome> {
        compliance::recompute_expired(self.store.as_ref(), as_of, self.sweep_concurrency, cancel)
            .await
    }

    pub async fn sync_admission_record(
        &self,
        scope: TenantScope,
        subject_id: i64,
        company_id: i64,
        issue_date: NaiveDate,
        validity_date: NaiveDate,
        as_of: NaiveDate,
    ) -> EngineResult<ComplianceRecord> {
        let synced = compliance::sync_admission_record(
            self.store.as_ref(),
            scope.tenant_id(),
            subject_id,
            company_id,
            issue_date,
            validity_date,
            as_of,
        )
        .await?;
        Ok(synced.record)
    }

    pub async fn backfill_admission_records(
        &self,
        scope: TenantScope,
        as_of: NaiveDate,
    ) -> EngineResult<BackfillOutcome> {
        compliance::backfill_admission_records(
            self.store.as_ref(),
            scope.tenant_id(),
            as_of,
            self.sweep_concurrency,
        )
        .await
    }

    pub async fn compliance_overview(
        &self,
        scope: TenantScope,
        as_of: NaiveDate,
    ) -> EngineResult<ComplianceOverview> {
        compliance::compliance_overview(self.store.as_ref(), scope.tenant_id(), as_of).await
    }

    /// Pure advisory check. `Err` means misconfiguration: the caller must
    /// deny, not default-allow.
    pub fn check_quantity_limit(
        &self,
        tier: PlanTier,
        kind: ResourceKind,
        current: i64,
    ) -> EngineResult<bool> {
        let limits = self.plans.limits(tier)?;
        Ok(limits.quantity(kind).admits(current))
    }

    pub fn check_feature_available(&self, tier: PlanTier, feature: Feature) -> EngineResult<bool> {
        let limits = self.plans.limits(tier)?;
        Ok(limits.feature(feature))
    }

    pub async fn count_resources(
        &self,
        scope: TenantScope,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<i64> {
        self.store
            .count_resources(scope.tenant_id(), kind, company_id)
            .await
    }

    /// Race-free admission for a resource creation: atomically takes a slot
    /// under the tenant's quota, or returns a typed `LimitExceeded` denial.
    pub async fn claim_resource(
        &self,
        scope: TenantScope,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<()> {
        let tenant_id = scope.tenant_id();
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "tenant",
                id: tenant_id.to_string(),
            })?;
        let quota = self.plans.limits(tenant.plan_tier)?.quantity(kind);

        if self
            .store
            .claim_resource_slot(tenant_id, kind, company_id, quota)
            .await?
        {
            return Ok(());
        }

        let current = self.store.count_resources(tenant_id, kind, company_id).await?;
        Err(EngineError::LimitExceeded {
            resource: kind.as_str(),
            current,
            limit: quota.ceiling().unwrap_or(current),
        })
    }

    /// Undo a claim when the surrounding creation fails or the resource is
    /// deleted.
    pub async fn release_resource(
        &self,
        scope: TenantScope,
        kind: ResourceKind,
        company_id: Option<i64>,
    ) -> EngineResult<()> {
        self.store
            .release_resource_slot(scope.tenant_id(), kind, company_id)
            .await
    }

    /// Typed feature gate against the tenant's current tier.
    pub async fn ensure_feature(&self, scope: TenantScope, feature: Feature) -> EngineResult<()> {
        let tenant_id = scope.tenant_id();
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await?
            .ok_or(EngineError::NotFound {
                entity: "tenant",
                id: tenant_id.to_string(),
            })?;
        if self.plans.limits(tenant.plan_tier)?.feature(feature) {
            Ok(())
        } else {
            Err(EngineError::FeatureUnavailable {
                feature: feature.as_str(),
            })
        }
    }
}
