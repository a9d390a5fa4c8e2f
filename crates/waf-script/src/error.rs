use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 校验错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    Empty,
    TooLarge,
    Syntax,
    DisallowedIdentifier,
    UnknownContextField,
    InvalidField,
}

/// 规则校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: Option<usize>, column: Option<usize>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// Error for a non-code field such as `slug` or `name`.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::new(
            ValidationErrorKind::InvalidField,
            format!("{}: {}", field, message.into()),
        )
    }
}
