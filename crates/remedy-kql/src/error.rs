use thiserror::Error;

/// Errors raised while tokenizing or parsing a KQL query string. Every
/// variant carries the byte offset it was raised at so callers can render
/// position context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KqlError {
    #[error("unterminated string starting at byte {at}")]
    UnterminatedString { at: usize },

    #[error("missing ')' to close the group opened at byte {opened_at}")]
    MissingRParen { opened_at: usize },

    #[error("unexpected ')' at byte {at}")]
    UnexpectedRParen { at: usize },

    #[error("missing value after ':' at byte {at}")]
    MissingValue { at: usize },

    #[error("trailing boolean operator {operator:?} at byte {at}")]
    TrailingOperator { operator: String, at: usize },

    #[error("unexpected token {token:?} at byte {at}")]
    UnexpectedToken { token: String, at: usize },

    #[error("unknown field {field:?}")]
    UnknownField { field: String },
}
