use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use waf_types::{DomainPolicy, ExecutionBudget, FailPolicy, PolicyTable};

use crate::domain::DomainOverride;

/// 全局配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub store: StoreConfig,
    pub validator: ValidatorConfig,
    pub sandbox: ExecutionBudget,
    pub pipeline: PipelineConfig,
    /// 按域名覆盖
    pub domains: HashMap<String, DomainOverride>,
}

/// 服务配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 会话校验配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            token_expiration_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// JSON 格式输出
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Prometheus 导出
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
}

/// 规则存储配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// file 后端的数据目录
    pub data_dir: PathBuf,
    pub snapshot_ttl_ms: u64,
    pub staleness_alarm_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            data_dir: PathBuf::from("./data/waf"),
            snapshot_ttl_ms: 1000,
            staleness_alarm_secs: 60,
        }
    }
}

/// 规则校验配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub max_code_bytes: usize,
    pub cache_capacity: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_code_bytes: 16 * 1024,
            cache_capacity: 4096,
        }
    }
}

/// 流水线配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fail_policy: FailPolicy,
    pub fault_status: u16,
    pub fault_log_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fail_policy: FailPolicy::Closed,
            fault_status: 503,
            fault_log_capacity: 1024,
        }
    }
}

impl GlobalConfig {
    pub fn default_policy(&self) -> DomainPolicy {
        DomainPolicy {
            fail_policy: self.pipeline.fail_policy,
            fault_status: self.pipeline.fault_status,
            budget: self.sandbox,
        }
    }

    /// 以 TOML 形式输出（含默认值）
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 合并全局与域名覆盖
    pub fn policy_table(&self) -> PolicyTable {
        let default = self.default_policy();
        let mut table = PolicyTable::new(default.clone());
        for (domain, overrides) in &self.domains {
            table.insert(domain.to_ascii_lowercase(), overrides.merge_with_global(&default));
        }
        table
    }
}
