use thiserror::Error;

/// Errors that can occur when turning filter text into an expression tree
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("Empty filter expression")]
    Empty,

    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("Unexpected end of filter expression")]
    UnexpectedEnd,

    #[error("Unterminated quoted string starting at position {position}")]
    UnterminatedQuote { position: usize },

    #[error("Unknown operator: '{0}'. Valid operators are: ==, !=, matches, contains, present, >, <")]
    UnknownOperator(String),
}
