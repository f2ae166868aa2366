use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// key: plan-tiers -> entitlement ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Bronze => "bronze",
            PlanTier::Silver => "silver",
            PlanTier::Gold => "gold",
            PlanTier::Diamond => "diamond",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "bronze" => Ok(PlanTier::Bronze),
            "silver" => Ok(PlanTier::Silver),
            "gold" => Ok(PlanTier::Gold),
            "diamond" => Ok(PlanTier::Diamond),
            other => Err(EngineError::configuration(format!(
                "unknown plan tier {other:?}"
            ))),
        }
    }
}

/// Countable resource kinds gated by per-tier maximums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Companies,
    Subjects,
    Worksites,
    Trainings,
    ProtectiveEquipment,
    Roles,
    Departments,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Companies => "companies",
            ResourceKind::Subjects => "subjects",
            ResourceKind::Worksites => "worksites",
            ResourceKind::Trainings => "trainings",
            ResourceKind::ProtectiveEquipment => "protective_equipment",
            ResourceKind::Roles => "roles",
            ResourceKind::Departments => "departments",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "companies" => Ok(ResourceKind::Companies),
            "subjects" => Ok(ResourceKind::Subjects),
            "worksites" => Ok(ResourceKind::Worksites),
            "trainings" => Ok(ResourceKind::Trainings),
            "protective_equipment" => Ok(ResourceKind::ProtectiveEquipment),
            "roles" => Ok(ResourceKind::Roles),
            "departments" => Ok(ResourceKind::Departments),
            other => Err(EngineError::configuration(format!(
                "unknown resource kind {other:?}"
            ))),
        }
    }
}

/// Boolean feature flags gated per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    CertificateManagement,
    OccupationalReports,
    ServiceOrders,
    AdvancedReports,
    DataExport,
    ApiIntegration,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::CertificateManagement => "certificate_management",
            Feature::OccupationalReports => "occupational_reports",
            Feature::ServiceOrders => "service_orders",
            Feature::AdvancedReports => "advanced_reports",
            Feature::DataExport => "data_export",
            Feature::ApiIntegration => "api_integration",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "certificate_management" => Ok(Feature::CertificateManagement),
            "occupational_reports" => Ok(Feature::OccupationalReports),
            "service_orders" => Ok(Feature::ServiceOrders),
            "advanced_reports" => Ok(Feature::AdvancedReports),
            "data_export" => Ok(Feature::DataExport),
            "api_integration" => Ok(Feature::ApiIntegration),
            other => Err(EngineError::configuration(format!(
                "unknown feature flag {other:?}"
            ))),
        }
    }
}

/// A per-tier quantity ceiling. Serialized as an integer with `-1` meaning
/// unlimited, matching the catalog file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Unlimited,
    Max(i64),
}

impl Quota {
    /// True when one more resource may be created given `current` existing.
    /// Under `Max(n)` the n-th creation is the last one admitted.
    pub fn admits(self, current: i64) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Max(limit) => current < limit,
        }
    }

    pub fn ceiling(self) -> Option<i64> {
        match self {
            Quota::Unlimited => None,
            Quota::Max(limit) => Some(limit),
        }
    }
}

impl Serialize for Quota {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quota::Unlimited => serializer.serialize_i64(-1),
            Quota::Max(limit) => serializer.serialize_i64(*limit),
        }
    }
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        if raw < 0 {
            Ok(Quota::Unlimited)
        } else {
            Ok(Quota::Max(raw))
        }
    }
}

/// key: plan-limits -> static entitlements for one tier
///
/// `max_subjects` is per company, the rest are tenant-wide. The validity
/// durations and support flags are read-only metadata surfaced next to the
/// gates; nothing in this crate mutates them at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_companies: Quota,
    pub max_subjects: Quota,
    pub max_worksites: Quota,
    pub max_trainings: Quota,
    pub max_protective_equipment: Quota,
    pub max_roles: Quota,
    pub max_departments: Quota,

    pub certificate_management: bool,
    pub occupational_reports: bool,
    pub service_orders: bool,
    pub advanced_reports: bool,
    pub data_export: bool,
    pub api_integration: bool,

    pub certificate_validity_days: u32,
    pub training_validity_days: u32,
    pub equipment_validity_days: u32,
    pub max_attachment_mb: u32,
    pub priority_support: bool,
    pub whatsapp_support: bool,
}

impl PlanLimits {
    pub fn quantity(&self, kind: ResourceKind) -> Quota {
        match kind {
            ResourceKind::Companies => self.max_companies,
            ResourceKind::Subjects => self.max_subjects,
            ResourceKind::Worksites => self.max_worksites,
            ResourceKind::Trainings => self.max_trainings,
            ResourceKind::ProtectiveEquipment => self.max_protective_equipment,
            ResourceKind::Roles => self.max_roles,
            ResourceKind::Departments => self.max_departments,
        }
    }

    pub fn feature(&self, feature: Feature) -> bool {
        match feature {
            Feature::CertificateManagement => self.certificate_management,
            Feature::OccupationalReports => self.occupational_reports,
            Feature::ServiceOrders => self.service_orders,
            Feature::AdvancedReports => self.advanced_reports,
            Feature::DataExport => self.data_export,
            Feature::ApiIntegration => self.api_integration,
        }
    }
}

/// True if one more item may be created under `quota` given `current` items.
pub fn within_quantity_limit(current: i64, quota: Quota) -> bool {
    quota.admits(current)
}

/// True iff the named flag is set for the tier's limits.
pub fn feature_available(limits: &PlanLimits, feature: Feature) -> bool {
    limits.feature(feature)
}

/// key: plan-catalog -> immutable per-process tier table
///
/// Built once at startup and passed by reference; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanCatalog {
    tiers: HashMap<PlanTier, PlanLimits>,
}

impl PlanCatalog {
    /// The shipped tier table. A deployment may override it with a JSON file
    /// of the same shape (see `config::load_plan_catalog`).
    pub fn builtin() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert(
            PlanTier::Bronze,
            PlanLimits {
                max_companies: Quota::Max(5),
                max_subjects: Quota::Max(20),
                max_worksites: Quota::Unlimited,
                max_trainings: Quota::Unlimited,
                max_protective_equipment: Quota::Unlimited,
                max_roles: Quota::Unlimited,
                max_departments: Quota::Unlimited,
                certificate_management: true,
                occupational_reports: false,
                service_orders: false,
                advanced_reports: false,
                data_export: false,
                api_integration: false,
                certificate_validity_days: 30,
                training_validity_days: 180,
                equipment_validity_days: 365,
                max_attachment_mb: 5,
                priority_support: false,
                whatsapp_support: false,
            },
        );
        tiers.insert(
            PlanTier::Silver,
            PlanLimits {
                max_companies: Quota::Max(10),
                max_subjects: Quota::Max(30),
                max_worksites: Quota::Unlimited,
                max_trainings: Quota::Unlimited,
                max_protective_equipment: Quota::Unlimited,
                max_roles: Quota::Unlimited,
                max_departments: Quota::Unlimited,
                certificate_management: true,
                occupational_reports: true,
                service_orders: true,
                advanced_reports: true,
                data_export: true,
                api_integration: true,
                certificate_validity_days: 30,
                training_validity_days: 365,
                equipment_validity_days: 730,
                max_attachment_mb: 10,
                priority_support: true,
                whatsapp_support: false,
            },
        );
        tiers.insert(
            PlanTier::Gold,
            PlanLimits {
                max_companies: Quota::Unlimited,
                max_subjects: Quota::Unlimited,
                max_worksites: Quota::Unlimited,
                max_trainings: Quota::Unlimited,
                max_protective_equipment: Quota::Unlimited,
                max_roles: Quota::Unlimited,
                max_departments: Quota::Unlimited,
                certificate_management: true,
                occupational_reports: true,
                service_orders: true,
                advanced_reports: true,
                data_export: true,
                api_integration: true,
                certificate_validity_days: 30,
                training_validity_days: 1095,
                equipment_validity_days: 1825,
                max_attachment_mb: 50,
                priority_support: true,
                whatsapp_support: true,
            },
        );
        tiers.insert(
            PlanTier::Diamond,
            PlanLimits {
                max_companies: Quota::Unlimited,
                max_subjects: Quota::Unlimited,
                max_worksites: Quota::Unlimited,
                max_trainings: Quota::Unlimited,
                max_protective_equipment: Quota::Unlimited,
                max_roles: Quota::Unlimited,
                max_departments: Quota::Unlimited,
                certificate_management: true,
                occupational_reports: true,
                service_orders: true,
                advanced_reports: true,
                data_export: true,
                api_integration: true,
                certificate_validity_days: 30,
                training_validity_days: 1095,
                equipment_validity_days: 1825,
                max_attachment_mb: 50,
                priority_support: true,
                whatsapp_support: true,
            },
        );
        PlanCatalog { tiers }
    }

    pub fn from_json(raw: &str) -> EngineResult<Self> {
        let catalog: PlanCatalog = serde_json::from_str(raw)
            .map_err(|err| EngineError::configuration(format!("invalid plan catalog: {err}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> EngineResult<()> {
        for tier in [
            PlanTier::Bronze,
            PlanTier::Silver,
            PlanTier::Gold,
            PlanTier::Diamond,
        ] {
            if !self.tiers.contains_key(&tier) {
                return Err(EngineError::configuration(format!(
                    "plan catalog is missing tier {tier}"
                )));
            }
        }
        Ok(())
    }

    /// Fails closed: an unknown tier is a `Configuration` error, never a
    /// default allowance.
    pub fn limits(&self, tier: PlanTier) -> EngineResult<&PlanLimits> {
        self.tiers.get(&tier).ok_or_else(|| {
            EngineError::configuration(format!("plan catalog has no limits for tier {tier}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_quota_admits_exactly_limit_creations() {
        let quota = Quota::Max(3);
        assert!(within_quantity_limit(0, quota));
        assert!(within_quantity_limit(2, quota));
        assert!(!within_quantity_limit(3, quota));
        assert!(!within_quantity_limit(10, quota));
    }

    #[test]
    fn unlimited_quota_admits_any_count() {
        for current in [0, 1, 1_000_000] {
            assert!(within_quantity_limit(current, Quota::Unlimited));
        }
    }

    #[test]
    fn builtin_catalog_feature_ladder() {
        let catalog = PlanCatalog::builtin();
        let bronze = catalog.limits(PlanTier::Bronze).unwrap();
        assert!(feature_available(bronze, Feature::CertificateManagement));
        assert!(!feature_available(bronze, Feature::OccupationalReports));
        assert!(!feature_available(bronze, Feature::ApiIntegration));

        let silver = catalog.limits(PlanTier::Silver).unwrap();
        assert!(feature_available(silver, Feature::OccupationalReports));
        assert!(feature_available(silver, Feature::DataExport));
        assert!(!silver.whatsapp_support);

        let diamond = catalog.limits(PlanTier::Diamond).unwrap();
        assert_eq!(diamond.max_companies, Quota::Unlimited);
        assert!(diamond.whatsapp_support);
    }

    #[test]
    fn quota_round_trips_through_the_sentinel_encoding() {
        let encoded = serde_json::to_string(&Quota::Unlimited).unwrap();
        assert_eq!(encoded, "-1");
        let decoded: Quota = serde_json::from_str("-1").unwrap();
        assert_eq!(decoded, Quota::Unlimited);
        let decoded: Quota = serde_json::from_str("20").unwrap();
        assert_eq!(decoded, Quota::Max(20));
    }

    #[test]
    fn catalog_missing_a_tier_is_rejected() {
        let raw = r#"{ "bronze": {
            "max_companies": 5, "max_subjects": 20, "max_worksites": -1,
            "max_trainings": -1, "max_protective_equipment": -1,
            "max_roles": -1, "max_departments": -1,
            "certificate_management": true, "occupational_reports": false,
            "service_orders": false, "advanced_reports": false,
            "data_export": false, "api_integration": false,
            "certificate_validity_days": 30, "training_validity_days": 180,
            "equipment_validity_days": 365, "max_attachment_mb": 5,
            "priority_support": false, "whatsapp_support": false
        } }"#;
        assert!(PlanCatalog::from_json(raw).is_err());
    }

    #[test]
    fn unknown_names_fail_closed() {
        assert!("platinum".parse::<PlanTier>().is_err());
        assert!("teleportation".parse::<Feature>().is_err());
        assert!("gadgets".parse::<ResourceKind>().is_err());
    }
}
