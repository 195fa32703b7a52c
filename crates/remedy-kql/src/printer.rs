//! Pretty-prints an AST back into KQL text with explicit operators and full
//! parenthesisation, so it can be re-tokenized unambiguously ( round-trip
//! property). Used by tests and by diagnostics that echo a normalised query
//! back to a caller.

use crate::ast::{Leaf, LeafOp, QueryNode};

pub fn to_kql_text(node: &QueryNode) -> String {
    match node {
        QueryNode::Leaf(leaf) => print_leaf(leaf),
        QueryNode::And(children) => print_bool(children, "AND"),
        QueryNode::Or(children) => print_bool(children, "OR"),
        QueryNode::Not(child) => format!("NOT ({})", to_kql_text(child)),
    }
}

fn print_bool(children: &[QueryNode], joiner: &str) -> String {
    let parts: Vec<_> = children.iter().map(to_kql_text).collect();
    format!("({})", parts.join(&format!(" {joiner} ")))
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty() || value.chars().any(|c| c.is_whitespace())
}

fn quoted(value: &str) -> String {
    if needs_quotes(value) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

fn print_leaf(leaf: &Leaf) -> String {
    let Some(field) = &leaf.field else {
        return format!("\"{}\"", leaf.value);
    };
    let value = quoted(&leaf.value);
    match leaf.op {
        LeafOp::Equals | LeafOp::Wildcard => format!("{field}:{value}"),
        LeafOp::NotEquals => format!("NOT ({field}:{value})"),
        LeafOp::GreaterThan => format!("{field}:>{value}"),
        LeafOp::GreaterEqual => format!("{field}:>={value}"),
        LeafOp::LessThan => format!("{field}:<{value}"),
        LeafOp::LessEqual => format!("{field}:<={value}"),
        LeafOp::FullText => unreachable!("FullText leaves never carry a field"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn round_trip(input: &str) {
        let ast = parse(input).unwrap();
        let printed = to_kql_text(ast.as_ref().unwrap());
        let reparsed = parse(&printed).unwrap();
        assert_eq!(ast, reparsed, "round trip changed meaning: {input:?} -> {printed:?}");
    }

    #[test]
    fn simple_leaf_round_trips() {
        round_trip("type:API");
    }

    #[test]
    fn comparator_round_trips() {
        round_trip("duration:>1000");
        round_trip("duration:>=1000");
    }

    #[test]
    fn wildcard_round_trips() {
        round_trip("form:HPD*");
    }

    #[test]
    fn boolean_tree_round_trips() {
        round_trip("type:API AND (duration:>1000 OR NOT status:false)");
    }

    #[test]
    fn full_text_round_trips() {
        round_trip(r#""deadlock detected""#);
    }

    #[test]
    fn quoted_value_with_space_round_trips() {
        round_trip(r#"form:"Help Desk""#);
    }
}
