use std::fs;

use once_cell::sync::Lazy;

use crate::error::{EngineError, EngineResult};
use crate::plans::PlanCatalog;

/// Seconds between scheduler ticks. Defaults to one day; the batch entry
/// points are idempotent, so a shorter interval is safe.
pub static SWEEP_SCAN_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("SWEEP_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(86_400)
});

/// Upper bound on in-flight row updates during a batch pass. Defaults to `8`.
pub static SWEEP_CONCURRENCY: Lazy<usize> = Lazy::new(|| {
    std::env::var("SWEEP_CONCURRENCY")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(8)
});

/// Optional path to a JSON plan-catalog override. When unset the shipped
/// tier table is used.
pub static PLAN_CATALOG_PATH: Lazy<Option<String>> = Lazy::new(|| {
    std::env::var("PLAN_CATALOG_PATH")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
});

/// Build the process-wide plan catalog once at startup. A present but
/// unreadable or invalid override file is a startup failure, not a silent
/// fallback.
pub fn load_plan_catalog() -> EngineResult<PlanCatalog> {
    match PLAN_CATALOG_PATH.as_deref() {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|err| {
                EngineError::configuration(format!("cannot read plan catalog at {path}: {err}"))
            })?;
            PlanCatalog::from_json(&raw)
        }
        None => Ok(PlanCatalog::builtin()),
    }
}
