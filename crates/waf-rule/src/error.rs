use thiserror::Error;
use waf_script::ValidationError;

/// 规则管理错误
#[derive(Error, Debug)]
pub enum RuleError {
    /// 规则校验失败，存储未改动
    #[error("Rule validation failed: {}", summarize(.0))]
    Validation(Vec<ValidationError>),

    #[error("Rule not found: {0}")]
    NotFound(String),

    /// 提交的规则 ID 集合与存储不一致
    #[error("Rule set conflict: {0}")]
    Conflict(String),

    /// 持久层不可用
    #[error("Rule store unavailable: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, RuleError>;

impl RuleError {
    pub fn store(msg: impl Into<String>) -> Self {
        RuleError::Store(msg.into())
    }

    pub fn invalid_field(field: &str, msg: impl Into<String>) -> Self {
        RuleError::Validation(vec![ValidationError::field(field, msg)])
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
