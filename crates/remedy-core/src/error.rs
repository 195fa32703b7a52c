use thiserror::Error;

/// Errors raised at the boundary shared by every higher-level crate, before
/// any store call is attempted.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid tenant id {0:?}: must be a UUID")]
    InvalidTenantId(String),
}
