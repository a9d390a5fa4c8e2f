use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 规则运行期故障
///
/// Never surfaced to the proxy caller; the pipeline turns it into a decision
/// according to the domain's fail policy.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeFault {
    #[error("Execution timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Operation budget of {limit} exceeded")]
    OperationLimit { limit: u64 },

    #[error("Memory limit exceeded: {detail}")]
    MemoryLimit { detail: String },

    #[error("Invalid decision: {detail}")]
    InvalidDecision { detail: String },

    #[error("Script error: {message}")]
    Script { message: String },
}

impl RuntimeFault {
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeFault::Timeout { .. } => "timeout",
            RuntimeFault::OperationLimit { .. } => "operation_limit",
            RuntimeFault::MemoryLimit { .. } => "memory_limit",
            RuntimeFault::InvalidDecision { .. } => "invalid_decision",
            RuntimeFault::Script { .. } => "script",
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        RuntimeFault::InvalidDecision {
            detail: detail.into(),
        }
    }

    pub fn script(message: impl Into<String>) -> Self {
        RuntimeFault::Script {
            message: message.into(),
        }
    }
}
