use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use waf_types::{Decision, RuntimeFault};

/// 故障后的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultAction {
    /// fail-closed：请求被拒绝
    Blocked,
    /// fail-open：跳过该规则
    Skipped,
}

/// 规则故障记录
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRecord {
    pub domain: String,
    pub rule_id: String,
    pub rule_name: String,
    pub fault: RuntimeFault,
    pub action: FaultAction,
    pub occurred_at: DateTime<Utc>,
}

/// 最近故障（有界）
pub struct FaultLog {
    capacity: usize,
    records: RwLock<VecDeque<FaultRecord>>,
}

impl FaultLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, record: FaultRecord) {
        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Newest first.
    pub async fn recent(&self, domain: &str, limit: usize) -> Vec<FaultRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .rev()
            .filter(|r| r.domain == domain)
            .take(limit)
            .cloned()
            .collect()
    }
}

/// 规则试运行结果
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<RuntimeFault>,
    pub duration_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(domain: &str, rule_id: &str) -> FaultRecord {
        FaultRecord {
            domain: domain.to_string(),
            rule_id: rule_id.to_string(),
            rule_name: rule_id.to_string(),
            fault: RuntimeFault::script("boom"),
            action: FaultAction::Blocked,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fault_log_is_bounded_and_filtered() {
        let log = FaultLog::new(3);
        log.push(record("a.com", "1")).await;
        log.push(record("b.com", "2")).await;
        log.push(record("a.com", "3")).await;
        log.push(record("a.com", "4")).await;

        let recent = log.recent("a.com", 10).await;
        let ids: Vec<_> = recent.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "3"]);
        assert!(log.recent("b.com", 10).await.len() == 1);
    }
}
