use remedy_core::CoreError;
use thiserror::Error;

/// Error taxonomy for every analytics/health-scoring operation. `Store` and `Cancelled`
/// carry the operation name so callers can log/translate without re-deriving
/// it from the call site.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("invalid tenant id: {0}")]
    InvalidTenant(#[from] CoreError),

    #[error("unknown field {field:?} in operation {operation}")]
    UnknownField { operation: &'static str, field: String },

    #[error("{operation}: not found")]
    NotFound { operation: &'static str },

    #[error("{operation}: store failure: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: clickhouse::error::Error,
    },

    #[error("{operation}: cancelled")]
    Cancelled { operation: &'static str },
}

impl AnalyticsError {
    pub fn store(operation: &'static str, source: clickhouse::error::Error) -> Self {
        AnalyticsError::Store { operation, source }
    }
}
