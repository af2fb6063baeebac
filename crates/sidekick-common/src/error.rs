use thiserror::Error;

/// Failure to parse one of the string-keyed vocabularies (prompt types,
/// session kinds, response sources).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value}. Must be one of: {expected}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ParseError {
    pub fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}
