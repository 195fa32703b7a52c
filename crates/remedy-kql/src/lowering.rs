//! Lowers a [`QueryNode`] AST into a parameterised SQL predicate.
//!
//! The emitted SQL uses positional `?` placeholders; callers that need named
//! ClickHouse parameters rewrite them in a single pass over the returned
//! `Vec<String>` (remedy-analytics does this, since the binding convention is
//! a store concern, not a query-language one).

use crate::ast::{Leaf, LeafOp, QueryNode};
use crate::error::KqlError;
use crate::whitelist;

/// Controls how a field name that isn't in the alias table is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Unknown fields pass through verbatim as a column name — used at
    /// free-text search call sites.
    Passthrough,
    /// Unknown fields are rejected with [`KqlError::UnknownField`] — used at
    /// autocomplete/facet call sites.
    Strict,
}

/// Lower `node` (or `None` for the null/"match everything" AST) into a SQL
/// fragment and its positional parameters.
pub fn to_where_clause(
    node: Option<&QueryNode>,
    policy: FieldPolicy,
) -> Result<(String, Vec<String>), KqlError> {
    match node {
        None => Ok(("1=1".to_string(), Vec::new())),
        Some(root) => {
            let mut params = Vec::new();
            let sql = lower(root, policy, &mut params)?;
            Ok((sql, params))
        }
    }
}

fn lower(node: &QueryNode, policy: FieldPolicy, params: &mut Vec<String>) -> Result<String, KqlError> {
    match node {
        QueryNode::Leaf(leaf) => lower_leaf(leaf, policy, params),
        QueryNode::And(children) => lower_bool(children, "AND", policy, params),
        QueryNode::Or(children) => lower_bool(children, "OR", policy, params),
        QueryNode::Not(child) => {
            let inner = lower(child, policy, params)?;
            Ok(format!("NOT ({inner})"))
        }
    }
}

fn lower_bool(
    children: &[QueryNode],
    joiner: &str,
    policy: FieldPolicy,
    params: &mut Vec<String>,
) -> Result<String, KqlError> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        parts.push(lower(child, policy, params)?);
    }
    Ok(format!("({})", parts.join(&format!(" {joiner} "))))
}

fn resolve_column(field: &str, policy: FieldPolicy) -> Result<String, KqlError> {
    if let Some(column) = whitelist::resolve_alias(field) {
        return Ok(column.to_string());
    }
    match policy {
        FieldPolicy::Passthrough => Ok(field.to_string()),
        FieldPolicy::Strict => Err(KqlError::UnknownField {
            field: field.to_string(),
        }),
    }
}

fn lower_leaf(leaf: &Leaf, policy: FieldPolicy, params: &mut Vec<String>) -> Result<String, KqlError> {
    if leaf.op == LeafOp::FullText {
        params.push(format!("%{}%", leaf.value));
        return Ok("raw_text ILIKE ?".to_string());
    }

    let field = leaf.field.as_deref().unwrap_or_default();
    let column = resolve_column(field, policy)?;

    Ok(match leaf.op {
        LeafOp::Equals => {
            params.push(leaf.value.to_string());
            format!("{column} = ?")
        }
        LeafOp::NotEquals => {
            params.push(leaf.value.to_string());
            format!("{column} != ?")
        }
        LeafOp::GreaterThan => {
            params.push(leaf.value.to_string());
            format!("{column} > ?")
        }
        LeafOp::GreaterEqual => {
            params.push(leaf.value.to_string());
            format!("{column} >= ?")
        }
        LeafOp::LessThan => {
            params.push(leaf.value.to_string());
            format!("{column} < ?")
        }
        LeafOp::LessEqual => {
            params.push(leaf.value.to_string());
            format!("{column} <= ?")
        }
        LeafOp::Wildcard => {
            params.push(leaf.value.replace('*', "%"));
            format!("{column} ILIKE ?")
        }
        LeafOp::FullText => unreachable!("handled above"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn null_ast_lowers_to_match_all() {
        let (sql, params) = to_where_clause(None, FieldPolicy::Passthrough).unwrap();
        assert_eq!(sql, "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn known_alias_resolves_to_its_column() {
        let ast = parse("type:API").unwrap();
        let (sql, params) = to_where_clause(ast.as_ref(), FieldPolicy::Passthrough).unwrap();
        assert_eq!(sql, "log_type = ?");
        assert_eq!(params, vec!["API".to_string()]);
    }

    #[test]
    fn unknown_field_passes_through_in_permissive_mode() {
        let ast = parse("custom_field:value").unwrap();
        let (sql, _) = to_where_clause(ast.as_ref(), FieldPolicy::Passthrough).unwrap();
        assert_eq!(sql, "custom_field = ?");
    }

    #[test]
    fn unknown_field_is_rejected_in_strict_mode() {
        let ast = parse("custom_field:value").unwrap();
        let err = to_where_clause(ast.as_ref(), FieldPolicy::Strict).unwrap_err();
        assert!(matches!(err, KqlError::UnknownField { .. }));
    }

    #[test]
    fn wildcard_translates_asterisk_to_percent() {
        let ast = parse("form:HPD*").unwrap();
        let (sql, params) = to_where_clause(ast.as_ref(), FieldPolicy::Passthrough).unwrap();
        assert_eq!(sql, "form ILIKE ?");
        assert_eq!(params, vec!["HPD%".to_string()]);
    }

    #[test]
    fn full_text_wraps_value_with_percent_signs() {
        let ast = parse(r#""deadlock detected""#).unwrap();
        let (sql, params) = to_where_clause(ast.as_ref(), FieldPolicy::Passthrough).unwrap();
        assert_eq!(sql, "raw_text ILIKE ?");
        pretty_assertions::assert_eq!(params, vec!["%deadlock detected%".to_string()]);
    }

    #[test]
    fn and_or_emit_fully_parenthesised_groups() {
        let ast = parse("type:API AND (duration:>1000 OR status:false)").unwrap();
        let (sql, params) = to_where_clause(ast.as_ref(), FieldPolicy::Passthrough).unwrap();
        assert_eq!(sql, "(log_type = ? AND (duration_ms > ? OR success = ?))");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn not_wraps_its_child() {
        let ast = parse("NOT type:API").unwrap();
        let (sql, _) = to_where_clause(ast.as_ref(), FieldPolicy::Passthrough).unwrap();
        assert_eq!(sql, "NOT (log_type = ?)");
    }

    #[test]
    fn param_count_matches_placeholder_count() {
        let ast = parse("type:API AND user:jdoe AND duration:>500").unwrap();
        let (sql, params) = to_where_clause(ast.as_ref(), FieldPolicy::Passthrough).unwrap();
        assert_eq!(sql.matches('?').count(), params.len());
    }
}
