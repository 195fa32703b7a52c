use crate::error::CoreError;

/// Reject a malformed `tenant_id` before any store call is attempted. This
/// guards the set-tenant-context path in the (out-of-scope) relational
/// metadata store that every query ultimately flows through.
pub fn validate_tenant_id(tenant_id: &str) -> Result<(), CoreError> {
    uuid::Uuid::parse_str(tenant_id)
        .map(|_| ())
        .map_err(|_| CoreError::InvalidTenantId(tenant_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_valid_uuid() {
        assert!(validate_tenant_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn rejects_a_non_uuid() {
        assert!(validate_tenant_id("not-a-uuid").is_err());
        assert!(validate_tenant_id("").is_err());
    }
}
