//! Recursive-descent parser over the token stream produced by [`crate::lexer`]
//!. Grammar:
//!
//! ```text
//! query := or? EOF
//! or    := and (OR and)*
//! and   := not (AND? not)*          -- a bare atom start implies AND
//! not   := NOT not | atom
//! atom  := '(' or ')' | leaf
//! leaf  := word ':' [cmp] (word | quoted) | quoted | word
//! ```
//!
//! Empty or whitespace-only input parses to `None` rather than an error —
//! callers treat a null AST as "match everything".

use smol_str::SmolStr;

use crate::ast::{LeafOp, QueryNode};
use crate::error::KqlError;
use crate::lexer::tokenize;
use crate::token::{Token, TokenKind};

/// Parse a KQL query string into an AST. `Ok(None)` means the query was
/// empty (or whitespace-only) and should be treated as "match everything".
pub fn parse(input: &str) -> Result<Option<QueryNode>, KqlError> {
    let tokens = tokenize(input)?;
    Parser { tokens: &tokens, pos: 0 }.parse_query()
}

fn is_wildcard_value(value: &str) -> bool {
    value.contains('*')
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn parse_query(&mut self) -> Result<Option<QueryNode>, KqlError> {
        if self.at(TokenKind::Eof) {
            return Ok(None);
        }
        let node = self.parse_or()?;
        if !self.at(TokenKind::Eof) {
            let tok = self.peek().clone();
            return Err(match tok.kind {
                TokenKind::RParen => KqlError::UnexpectedRParen { at: tok.span.start },
                _ => KqlError::UnexpectedToken {
                    token: tok.text.to_string(),
                    at: tok.span.start,
                },
            });
        }
        Ok(Some(node))
    }

    fn parse_or(&mut self) -> Result<QueryNode, KqlError> {
        let mut nodes = vec![self.parse_and()?];
        while self.at(TokenKind::Or) {
            self.advance();
            if self.at_trailing_boundary() {
                let tok = self.peek().clone();
                return Err(KqlError::TrailingOperator {
                    operator: "OR".to_string(),
                    at: tok.span.start,
                });
            }
            nodes.push(self.parse_and()?);
        }
        Ok(if nodes.len() == 1 {
            nodes.pop().unwrap()
        } else {
            QueryNode::Or(nodes)
        })
    }

    fn parse_and(&mut self) -> Result<QueryNode, KqlError> {
        let mut nodes = vec![self.parse_not()?];
        loop {
            if self.at(TokenKind::And) {
                self.advance();
                if self.at_trailing_boundary() {
                    let tok = self.peek().clone();
                    return Err(KqlError::TrailingOperator {
                        operator: "AND".to_string(),
                        at: tok.span.start,
                    });
                }
                nodes.push(self.parse_not()?);
            } else if self.is_atom_start() {
                // Two atoms back to back with no explicit operator: implicit AND.
                nodes.push(self.parse_not()?);
            } else {
                break;
            }
        }
        Ok(if nodes.len() == 1 {
            nodes.pop().unwrap()
        } else {
            QueryNode::And(nodes)
        })
    }

    fn parse_not(&mut self) -> Result<QueryNode, KqlError> {
        if self.at(TokenKind::Not) {
            self.advance();
            if self.at_trailing_boundary() {
                let tok = self.peek().clone();
                return Err(KqlError::TrailingOperator {
                    operator: "NOT".to_string(),
                    at: tok.span.start,
                });
            }
            let child = self.parse_not()?;
            return Ok(QueryNode::Not(Box::new(child)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<QueryNode, KqlError> {
        if self.at(TokenKind::LParen) {
            let opened_at = self.peek().span.start;
            self.advance();
            let node = self.parse_or()?;
            if !self.at(TokenKind::RParen) {
                return Err(KqlError::MissingRParen { opened_at });
            }
            self.advance();
            return Ok(node);
        }
        self.parse_leaf()
    }

    fn parse_leaf(&mut self) -> Result<QueryNode, KqlError> {
        match self.peek().kind {
            TokenKind::Quoted => {
                let tok = self.advance();
                Ok(QueryNode::full_text(tok.text))
            }
            TokenKind::Word => {
                let field_tok = self.advance();
                if self.at(TokenKind::Colon) {
                    self.advance();
                    let op = self.parse_comparator();
                    if !matches!(self.peek().kind, TokenKind::Word | TokenKind::Quoted) {
                        let tok = self.peek().clone();
                        return Err(KqlError::MissingValue { at: tok.span.start });
                    }
                    let value_tok = self.advance();
                    let value: SmolStr = value_tok.text;
                    let op = if op == LeafOp::Equals && is_wildcard_value(&value) {
                        LeafOp::Wildcard
                    } else {
                        op
                    };
                    Ok(QueryNode::leaf(field_tok.text, op, value))
                } else {
                    Ok(QueryNode::full_text(field_tok.text))
                }
            }
            _ => {
                let tok = self.peek().clone();
                Err(KqlError::UnexpectedToken {
                    token: tok.text.to_string(),
                    at: tok.span.start,
                })
            }
        }
    }

    fn parse_comparator(&mut self) -> LeafOp {
        match self.peek().kind {
            TokenKind::Ge => {
                self.advance();
                LeafOp::GreaterEqual
            }
            TokenKind::Le => {
                self.advance();
                LeafOp::LessEqual
            }
            TokenKind::Gt => {
                self.advance();
                LeafOp::GreaterThan
            }
            TokenKind::Lt => {
                self.advance();
                LeafOp::LessThan
            }
            _ => LeafOp::Equals,
        }
    }

    fn is_atom_start(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Word | TokenKind::Quoted | TokenKind::LParen | TokenKind::Not
        )
    }

    /// True if the current token cannot start a right-hand operand — i.e. the
    /// operator we just consumed has nothing to apply to.
    fn at_trailing_boundary(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Eof | TokenKind::RParen | TokenKind::And | TokenKind::Or
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Leaf, LeafOp};

    fn leaf(field: &str, op: LeafOp, value: &str) -> QueryNode {
        QueryNode::leaf(field, op, value)
    }

    #[test]
    fn empty_input_parses_to_null_ast() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn bare_word_is_full_text() {
        assert_eq!(parse("timeout").unwrap(), Some(QueryNode::full_text("timeout")));
    }

    #[test]
    fn field_value_defaults_to_equals() {
        assert_eq!(
            parse("type:API").unwrap(),
            Some(leaf("type", LeafOp::Equals, "API"))
        );
    }

    #[test]
    fn explicit_comparators_parse() {
        assert_eq!(
            parse("duration:>1000").unwrap(),
            Some(leaf("duration", LeafOp::GreaterThan, "1000"))
        );
        assert_eq!(
            parse("duration:>=1000").unwrap(),
            Some(leaf("duration", LeafOp::GreaterEqual, "1000"))
        );
        assert_eq!(
            parse("duration:<1000").unwrap(),
            Some(leaf("duration", LeafOp::LessThan, "1000"))
        );
        assert_eq!(
            parse("duration:<=1000").unwrap(),
            Some(leaf("duration", LeafOp::LessEqual, "1000"))
        );
    }

    #[test]
    fn wildcard_value_is_detected_without_explicit_operator() {
        assert_eq!(
            parse("form:HPD*").unwrap(),
            Some(leaf("form", LeafOp::Wildcard, "HPD*"))
        );
    }

    #[test]
    fn implicit_and_joins_adjacent_atoms() {
        let got = parse("type:API form:HPD:Help").unwrap().unwrap();
        match got {
            QueryNode::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn or_binds_looser_than_and() {
        // a OR b AND c => Or(a, And(b, c))
        let got = parse("a OR b AND c").unwrap().unwrap();
        match got {
            QueryNode::Or(nodes) => {
                assert_eq!(nodes.len(), 2);
                assert_eq!(nodes[0], QueryNode::full_text("a"));
                match &nodes[1] {
                    QueryNode::And(inner) => assert_eq!(inner.len(), 2),
                    other => panic!("expected And, got {other:?}"),
                }
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn not_binds_tighter_than_and() {
        // NOT a AND b => And(Not(a), b)
        let got = parse("NOT a AND b").unwrap().unwrap();
        match got {
            QueryNode::And(nodes) => {
                assert_eq!(nodes.len(), 2);
                assert_eq!(nodes[0], QueryNode::Not(Box::new(QueryNode::full_text("a"))));
                assert_eq!(nodes[1], QueryNode::full_text("b"));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn double_negation_nests() {
        let got = parse("NOT NOT a").unwrap().unwrap();
        assert_eq!(
            got,
            QueryNode::Not(Box::new(QueryNode::Not(Box::new(QueryNode::full_text("a")))))
        );
    }

    #[test]
    fn keywords_are_case_insensitive_in_parsing() {
        let a = parse("a and b").unwrap().unwrap();
        let b = parse("a AND b").unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parens_override_precedence() {
        let got = parse("(a OR b) AND c").unwrap().unwrap();
        match got {
            QueryNode::And(nodes) => match &nodes[0] {
                QueryNode::Or(inner) => assert_eq!(inner.len(), 2),
                other => panic!("expected Or, got {other:?}"),
            },
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_group_is_an_error() {
        let err = parse("(a AND b").unwrap_err();
        assert!(matches!(err, KqlError::MissingRParen { .. }));
    }

    #[test]
    fn stray_rparen_is_an_error() {
        let err = parse("a)").unwrap_err();
        assert!(matches!(err, KqlError::UnexpectedRParen { .. }));
    }

    #[test]
    fn colon_with_no_value_is_an_error() {
        let err = parse("type:").unwrap_err();
        assert!(matches!(err, KqlError::MissingValue { .. }));
    }

    #[test]
    fn trailing_operator_is_an_error() {
        assert!(matches!(
            parse("a AND").unwrap_err(),
            KqlError::TrailingOperator { .. }
        ));
        assert!(matches!(
            parse("a OR").unwrap_err(),
            KqlError::TrailingOperator { .. }
        ));
        assert!(matches!(
            parse("NOT").unwrap_err(),
            KqlError::TrailingOperator { .. }
        ));
    }

    #[test]
    fn quoted_value_survives_as_leaf_value() {
        let got = parse(r#"form:"Help Desk""#).unwrap().unwrap();
        assert_eq!(
            got,
            QueryNode::Leaf(Leaf {
                field: Some("form".into()),
                op: LeafOp::Equals,
                value: "Help Desk".into(),
            })
        );
    }
}
