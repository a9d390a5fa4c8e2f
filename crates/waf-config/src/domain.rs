use serde::{Deserialize, Serialize};
use waf_types::{DomainPolicy, FailPolicy};

/// 域名配置（可覆盖全局）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DomainOverride {
    pub fail_policy: Option<FailPolicy>,
    pub fault_status: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub max_operations: Option<u64>,
    pub max_string_size: Option<usize>,
    pub max_collection_size: Option<usize>,
    pub max_call_depth: Option<usize>,
}

impl DomainOverride {
    /// 合并全局配置和域名配置
    pub fn merge_with_global(&self, global: &DomainPolicy) -> DomainPolicy {
        let mut budget = global.budget;
        budget.timeout_ms = self.timeout_ms.unwrap_or(budget.timeout_ms);
        budget.max_operations = self.max_operations.unwrap_or(budget.max_operations);
        budget.max_string_size = self.max_string_size.unwrap_or(budget.max_string_size);
        budget.max_collection_size = self
            .max_collection_size
            .unwrap_or(budget.max_collection_size);
        budget.max_call_depth = self.max_call_depth.unwrap_or(budget.max_call_depth);

        DomainPolicy {
            fail_policy: self.fail_policy.unwrap_or(global.fail_policy),
            fault_status: self.fault_status.unwrap_or(global.fault_status),
            budget,
        }
    }
}
