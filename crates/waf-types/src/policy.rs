use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::decision::Decision;

/// 单次规则执行预算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionBudget {
    /// 墙钟超时（毫秒）
    pub timeout_ms: u64,

    /// 最大操作数，0 表示不限制
    pub max_operations: u64,

    /// 字符串最大字节数
    pub max_string_size: usize,

    /// 数组/对象最大元素数
    pub max_collection_size: usize,

    /// 最大函数调用深度
    pub max_call_depth: usize,
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self {
            timeout_ms: 5,
            max_operations: 50_000,
            max_string_size: 64 * 1024,
            max_collection_size: 1024,
            max_call_depth: 16,
        }
    }
}

impl ExecutionBudget {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// 规则故障时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    /// 拒绝请求
    Closed,
    /// 跳过故障规则继续评估
    Open,
}

impl Default for FailPolicy {
    fn default() -> Self {
        FailPolicy::Closed
    }
}

/// 域名级执行策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainPolicy {
    pub fail_policy: FailPolicy,

    /// fail-closed 时返回的状态码
    pub fault_status: u16,

    pub budget: ExecutionBudget,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            fail_policy: FailPolicy::Closed,
            fault_status: 503,
            budget: ExecutionBudget::default(),
        }
    }
}

impl DomainPolicy {
    /// Decision substituted for a faulting rule, `None` when the rule is skipped.
    pub fn fault_decision(&self) -> Option<Decision> {
        match self.fail_policy {
            FailPolicy::Closed => Some(Decision::Block {
                status: self.fault_status,
                body: reason_phrase(self.fault_status).to_string(),
                headers: Default::default(),
            }),
            FailPolicy::Open => None,
        }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Request Blocked")
}

/// 全局默认策略与域名覆盖
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    default: DomainPolicy,
    domains: HashMap<String, DomainPolicy>,
}

impl PolicyTable {
    pub fn new(default: DomainPolicy) -> Self {
        Self {
            default,
            domains: HashMap::new(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>, policy: DomainPolicy) -> Self {
        self.domains.insert(domain.into(), policy);
        self
    }

    pub fn insert(&mut self, domain: impl Into<String>, policy: DomainPolicy) {
        self.domains.insert(domain.into(), policy);
    }

    pub fn get(&self, domain: &str) -> &DomainPolicy {
        self.domains.get(domain).unwrap_or(&self.default)
    }

    pub fn default_policy(&self) -> &DomainPolicy {
        &self.default
    }
}
