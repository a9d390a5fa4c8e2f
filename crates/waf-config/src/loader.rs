use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use waf_types::validate_domain;

use crate::{GlobalConfig, StoreBackend};

const CONFIG_FILE: &str = "waf.toml";
const ENV_PREFIX: &str = "WAF";

/// 配置加载器
pub struct ConfigLoader {
    config_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// 自定义环境变量前缀（默认 `WAF`，分隔符 `__`）
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// 加载全局配置
    ///
    /// A missing `waf.toml` means defaults; environment variables such as
    /// `WAF__SERVER__PORT` override either.
    pub fn load_global(&self) -> Result<GlobalConfig> {
        let config_path = self.config_path();

        let mut builder = Config::builder();
        if config_path.exists() {
            builder = builder.add_source(File::new(
                config_path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<GlobalConfig> {
        let global = self.load_global()?;
        check(&global)?;
        Ok(global)
    }
}

fn check(global: &GlobalConfig) -> Result<()> {
    let default = global.default_policy();
    let overrides = global
        .domains
        .values()
        .map(|o| o.merge_with_global(&default));
    for policy in std::iter::once(default.clone()).chain(overrides) {
        if policy.budget.timeout_ms == 0 {
            return Err(anyhow!("sandbox timeout_ms must be greater than 0"));
        }
        if !(100..=599).contains(&policy.fault_status) {
            return Err(anyhow!(
                "fault_status {} is not a valid HTTP status",
                policy.fault_status
            ));
        }
    }

    for domain in global.domains.keys() {
        validate_domain(&domain.to_ascii_lowercase())
            .map_err(|e| anyhow!("domains.{}: {}", domain, e))?;
    }

    if global.validator.max_code_bytes == 0 {
        return Err(anyhow!("validator max_code_bytes must be greater than 0"));
    }
    if global.pipeline.fault_log_capacity == 0 {
        return Err(anyhow!("pipeline fault_log_capacity must be greater than 0"));
    }
    if global.store.backend == StoreBackend::File && global.store.data_dir.as_os_str().is_empty() {
        return Err(anyhow!("store data_dir is required for the file backend"));
    }
    if global.auth.jwt_secret.is_empty() {
        return Err(anyhow!("auth jwt_secret must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use waf_types::FailPolicy;

    #[test]
    fn test_load_default_global_config() {
        let temp_dir = tempdir().unwrap();
        let loader = ConfigLoader::new(temp_dir.path()).with_env_prefix("WAF_TEST_DEFAULTS");

        let config = loader.load_global().unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.validator.max_code_bytes, 16 * 1024);
    }

    #[test]
    fn test_load_global_config_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_content = r#"
[server]
port = 9000

[store]
backend = "memory"

[sandbox]
timeout_ms = 10
max_operations = 20000

[pipeline]
fail_policy = "open"

[domains."shop.example"]
fail_policy = "closed"
fault_status = 502
"#;
        fs::write(temp_dir.path().join("waf.toml"), config_content).unwrap();

        let loader = ConfigLoader::new(temp_dir.path()).with_env_prefix("WAF_TEST_FILE");
        let config = loader.validate().unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.sandbox.timeout_ms, 10);
        assert_eq!(config.sandbox.max_collection_size, 1024);

        let table = config.policy_table();
        assert_eq!(table.get("other.example").fail_policy, FailPolicy::Open);
        let shop = table.get("shop.example");
        assert_eq!(shop.fail_policy, FailPolicy::Closed);
        assert_eq!(shop.fault_status, 502);
        assert_eq!(shop.budget.max_operations, 20000);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("waf.toml"), "[server]\nport = 9000\n").unwrap();
        std::env::set_var("WAF_TEST_ENV__SERVER__PORT", "9100");

        let loader = ConfigLoader::new(temp_dir.path()).with_env_prefix("WAF_TEST_ENV");
        let config = loader.load_global().unwrap();
        assert_eq!(config.server.port, 9100);

        std::env::remove_var("WAF_TEST_ENV__SERVER__PORT");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("waf.toml"),
            "[domains.\"bad_domain\"]\nfault_status = 42\n",
        )
        .unwrap();

        let loader = ConfigLoader::new(temp_dir.path()).with_env_prefix("WAF_TEST_INVALID");
        assert!(loader.validate().is_err());
    }
}
