//! Field-name resolution for query lowering.
//!
//! Two tables exist:
//! - [`resolve_alias`]: the permissive KQL-query alias table. A search query
//!   may still reference a field outside this table — [`crate::lowering`]'s
//!   passthrough policy lets it through verbatim so newly-added columns don't
//!   need a KQL-crate release to become searchable.
//! - [`is_facetable_column`]: the strict column whitelist used at facet and
//!   autocomplete call sites, where an unrecognised name is always rejected
//!   rather than passed through.

/// KQL alias -> physical column, for the permissive (search) lowering path.
const ALIASES: &[(&str, &str)] = &[
    ("type", "log_type"),
    ("log_type", "log_type"),
    ("user", "user"),
    ("form", "form"),
    ("queue", "queue"),
    ("timestamp", "timestamp"),
    ("thread", "thread_id"),
    ("trace", "trace_id"),
    ("rpc", "rpc_id"),
    ("duration", "duration_ms"),
    ("status", "success"),
    ("api_code", "api_code"),
    ("identifier", "api_code"),
    ("sql_table", "sql_table"),
    ("filter", "filter_name"),
    ("escalation", "esc_name"),
    ("error", "error_message"),
];

/// Columns that may be faceted or autocompleted against. Distinct from
/// [`ALIASES`]: this is keyed by physical column name, not KQL alias.
const FACETABLE_COLUMNS: &[&str] = &[
    "log_type",
    "user",
    "queue",
    "thread_id",
    "trace_id",
    "rpc_id",
    "api_code",
    "form",
    "operation",
    "request_id",
    "sql_table",
    "filter_name",
    "esc_name",
    "esc_pool",
    "duration_ms",
    "success",
    "error_encountered",
];

pub fn resolve_alias(field: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == field)
        .map(|(_, column)| *column)
}

pub fn is_facetable_column(column: &str) -> bool {
    FACETABLE_COLUMNS.contains(&column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_aliases_resolve_to_their_column() {
        assert_eq!(resolve_alias("type"), Some("log_type"));
        assert_eq!(resolve_alias("thread"), Some("thread_id"));
        assert_eq!(resolve_alias("status"), Some("success"));
    }

    #[test]
    fn unknown_alias_resolves_to_none() {
        assert_eq!(resolve_alias("not_a_real_field"), None);
    }

    #[test]
    fn facetable_columns_reject_unknown_names() {
        assert!(is_facetable_column("thread_id"));
        assert!(!is_facetable_column("raw_text"));
    }
}
