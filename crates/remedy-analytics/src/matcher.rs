//! Evaluates a KQL [`QueryNode`] directly against a [`LogEntry`] — the
//! in-memory counterpart to `remedy_kql::to_where_clause` + ClickHouse's
//! `ILIKE`/comparison semantics, used by [`crate::testing::InMemoryStore`]
//! so engine-level tests don't need a SQL evaluator.

use remedy_core::LogEntry;
use remedy_kql::{Leaf, LeafOp, QueryNode};

pub fn matches(entry: &LogEntry, node: &QueryNode) -> bool {
    match node {
        QueryNode::Leaf(leaf) => matches_leaf(entry, leaf),
        QueryNode::And(children) => children.iter().all(|c| matches(entry, c)),
        QueryNode::Or(children) => children.iter().any(|c| matches(entry, c)),
        QueryNode::Not(child) => !matches(entry, child),
    }
}

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_leaf(entry: &LogEntry, leaf: &Leaf) -> bool {
    if leaf.op == LeafOp::FullText {
        return contains_ci(&entry.raw_text, &leaf.value);
    }

    let field = leaf.field.as_deref().unwrap_or_default();
    let column = remedy_kql::whitelist::resolve_alias(field).unwrap_or(field);
    let actual = field_value(entry, column);

    match leaf.op {
        LeafOp::Equals => string_or_numeric_eq(&actual, &leaf.value),
        LeafOp::NotEquals => !string_or_numeric_eq(&actual, &leaf.value),
        LeafOp::GreaterThan => numeric_cmp(&actual, &leaf.value, |a, b| a > b),
        LeafOp::GreaterEqual => numeric_cmp(&actual, &leaf.value, |a, b| a >= b),
        LeafOp::LessThan => numeric_cmp(&actual, &leaf.value, |a, b| a < b),
        LeafOp::LessEqual => numeric_cmp(&actual, &leaf.value, |a, b| a <= b),
        LeafOp::Wildcard => wildcard_match(&leaf.value, &actual),
        LeafOp::FullText => unreachable!("handled above"),
    }
}

pub(crate) fn field_value(entry: &LogEntry, column: &str) -> String {
    match column {
        "log_type" => entry.log_type.as_str().to_string(),
        "user" => entry.user.to_string(),
        "form" => entry.form.to_string(),
        "queue" => entry.queue.to_string(),
        "timestamp" => entry.timestamp.to_rfc3339(),
        "thread_id" => entry.thread_id.to_string(),
        "trace_id" => entry.trace_id.to_string(),
        "rpc_id" => entry.rpc_id.to_string(),
        "duration_ms" => entry.duration_ms.to_string(),
        "queue_time_ms" => entry.queue_time_ms.to_string(),
        "success" => entry.success.to_string(),
        "api_code" => entry.api_code.to_string(),
        "sql_table" => entry.sql_table.to_string(),
        "filter_name" => entry.filter_name.to_string(),
        "esc_name" => entry.esc_name.to_string(),
        "esc_pool" => entry.esc_pool.to_string(),
        "operation" => entry.operation.to_string(),
        "request_id" => entry.request_id.to_string(),
        "error_message" => entry.error_message.to_string(),
        "error_encountered" => entry.error_encountered.to_string(),
        _ => String::new(),
    }
}

fn string_or_numeric_eq(actual: &str, expected: &str) -> bool {
    if let (Ok(a), Ok(b)) = (actual.parse::<f64>(), expected.parse::<f64>()) {
        return a == b;
    }
    actual.eq_ignore_ascii_case(expected)
}

fn numeric_cmp(actual: &str, expected: &str, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => op(a, b),
        _ => false,
    }
}

/// A simplified glob match: `*` matches any run of characters, case
/// insensitive, mirroring `col ILIKE ?` with `*` translated to `%`.
fn wildcard_match(pattern: &str, value: &str) -> bool {
    let value = value.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return value == pattern;
    }

    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !value[pos..].starts_with(part) {
                return false;
            }
            pos += part.len();
        } else if i == parts.len() - 1 {
            return value[pos..].ends_with(part);
        } else {
            match value[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_prefix_suffix_and_middle() {
        assert!(wildcard_match("hpd*", "hpd:help desk"));
        assert!(wildcard_match("*desk", "help desk"));
        assert!(wildcard_match("*elp d*", "help desk"));
        assert!(!wildcard_match("hpd*", "other"));
    }

    #[test]
    fn exact_match_without_wildcard_requires_full_equality() {
        assert!(wildcard_match("help desk", "help desk"));
        assert!(!wildcard_match("help", "help desk"));
    }
}
