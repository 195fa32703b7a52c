//! KQL tokenizer. Produces a flat token stream; whitespace separates tokens
//! and is otherwise discarded.

use crate::error::KqlError;
use crate::token::{Token, TokenKind};

/// Characters that terminate a bare `word` token. Deliberately excludes
/// anything a query ever needs to embed in an unquoted field name or value —
/// this also keeps an unknown, pass-through field name (see the lowering
/// whitelist policy) from ever containing SQL metacharacters.
fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ':' | '"' | '>' | '<' | ';')
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, KqlError> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < len {
        let c = input[i..].chars().next().unwrap();

        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::new(TokenKind::LParen, "(", i..i + 1));
                i += 1;
            }
            ')' => {
                tokens.push(Token::new(TokenKind::RParen, ")", i..i + 1));
                i += 1;
            }
            ':' => {
                tokens.push(Token::new(TokenKind::Colon, ":", i..i + 1));
                i += 1;
            }
            '>' => {
                if input[i..].starts_with(">=") {
                    tokens.push(Token::new(TokenKind::Ge, ">=", i..i + 2));
                    i += 2;
                } else {
                    tokens.push(Token::new(TokenKind::Gt, ">", i..i + 1));
                    i += 1;
                }
            }
            '<' => {
                if input[i..].starts_with("<=") {
                    tokens.push(Token::new(TokenKind::Le, "<=", i..i + 2));
                    i += 2;
                } else {
                    tokens.push(Token::new(TokenKind::Lt, "<", i..i + 1));
                    i += 1;
                }
            }
            '"' => {
                let start = i;
                let mut j = i + 1;
                let mut value = String::new();
                let mut closed = false;
                while j < len {
                    let cj = input[j..].chars().next().unwrap();
                    if cj == '"' {
                        closed = true;
                        j += 1;
                        break;
                    }
                    value.push(cj);
                    j += cj.len_utf8();
                }
                if !closed {
                    return Err(KqlError::UnterminatedString { at: start });
                }
                tokens.push(Token::new(TokenKind::Quoted, value, start..j));
                i = j;
            }
            ';' => {
                // Not a valid character anywhere in KQL; treat as an
                // unexpected token rather than silently swallowing it.
                return Err(KqlError::UnexpectedToken {
                    token: ";".to_string(),
                    at: i,
                });
            }
            _ => {
                let start = i;
                let mut j = i;
                while j < len {
                    let cj = input[j..].chars().next().unwrap();
                    if !is_word_char(cj) {
                        break;
                    }
                    j += cj.len_utf8();
                }
                let text = &input[start..j];
                let kind = match text.to_ascii_uppercase().as_str() {
                    "AND" => TokenKind::And,
                    "OR" => TokenKind::Or,
                    "NOT" => TokenKind::Not,
                    _ => TokenKind::Word,
                };
                tokens.push(Token::new(kind, text, start..j));
                i = j;
            }
        }
    }

    tokens.push(Token::new(TokenKind::Eof, "", len..len));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_field_value() {
        let toks = tokenize("type:API").unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Word, TokenKind::Colon, TokenKind::Word, TokenKind::Eof]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        for kw in ["and", "AND", "And", "or", "OR", "not", "NOT"] {
            let toks = tokenize(kw).unwrap();
            assert_ne!(toks[0].kind, TokenKind::Word, "{kw} should be a keyword token");
        }
    }

    #[test]
    fn quoted_strings_preserve_spaces() {
        let toks = tokenize(r#"form:"HPD:Help Desk""#).unwrap();
        assert_eq!(toks[2].kind, TokenKind::Quoted);
        assert_eq!(toks[2].text.as_str(), "HPD:Help Desk");
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize(r#"form:"unterminated"#).unwrap_err();
        assert!(matches!(err, KqlError::UnterminatedString { .. }));
    }

    #[test]
    fn comparator_operators_tokenize_distinctly() {
        let toks = tokenize("duration:>=1000").unwrap();
        assert_eq!(toks[2].kind, TokenKind::Ge);
    }
}
