//! Re-exports the strict column whitelist autocomplete validates against
//! — the table itself lives in `remedy_kql::whitelist` since
//! it's shared with the facet/autocomplete lowering policy in that crate.

pub use remedy_kql::whitelist::is_facetable_column;
