use thiserror::Error;

/// key: lifecycle-errors -> typed failure taxonomy
///
/// `Configuration` is the only variant worth paging on: it means the deployed
/// plan catalog or a stored enum value is broken, not that a caller hit an
/// ordinary business rule.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("plan limit reached for {resource}: {current} of {limit} in use")]
    LimitExceeded {
        resource: &'static str,
        current: i64,
        limit: i64,
    },
    #[error("feature {feature} is not available on the current plan")]
    FeatureUnavailable { feature: &'static str },
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("stale write on {entity} {id}: version {expected} is no longer current")]
    StaleWrite {
        entity: &'static str,
        id: String,
        expected: i64,
    },
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }

    /// Denials a gated endpoint should translate into a user-facing message
    /// rather than treat as a system fault.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            EngineError::LimitExceeded { .. } | EngineError::FeatureUnavailable { .. }
        )
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Storage(err.into())
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Storage(err)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
