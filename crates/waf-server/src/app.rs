use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use waf_api::{create_router, AppState};
use waf_config::{GlobalConfig, StoreBackend};
use waf_middleware::{JwtSessionVerifier, SessionVerifier};
use waf_rule::{
    FileRuleRepository, MemoryRuleRepository, PipelineCoordinator, RuleRepository, RuleStore,
    StoreOptions,
};
use waf_script::{RuleCompiler, ValidationError};

use crate::metrics::init_metrics;

/// 按配置组装服务状态
pub async fn build_state(config: &GlobalConfig) -> Result<AppState> {
    let repository: Arc<dyn RuleRepository> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory rule store, rules are lost on restart");
            Arc::new(MemoryRuleRepository::new())
        }
        StoreBackend::File => Arc::new(
            FileRuleRepository::new(&config.store.data_dir)
                .await
                .with_context(|| format!("opening rule store at {:?}", config.store.data_dir))?,
        ),
    };

    let compiler = Arc::new(RuleCompiler::new(
        config.validator.max_code_bytes,
        config.validator.cache_capacity,
    ));
    let store = Arc::new(RuleStore::with_options(
        repository,
        compiler,
        StoreOptions {
            snapshot_ttl: Duration::from_millis(config.store.snapshot_ttl_ms),
            staleness_alarm: Duration::from_secs(config.store.staleness_alarm_secs),
        },
    ));
    let pipeline = Arc::new(
        PipelineCoordinator::new(store.clone(), config.policy_table())
            .with_fault_log_capacity(config.pipeline.fault_log_capacity),
    );
    let verifier: Arc<dyn SessionVerifier> = Arc::new(JwtSessionVerifier::new(
        config.auth.jwt_secret.clone(),
        config.auth.token_expiration_hours,
    ));

    Ok(AppState::new(store, pipeline, verifier))
}

/// 启动管理 API
pub async fn serve(config: GlobalConfig) -> Result<()> {
    if config.metrics.enabled {
        let addr: SocketAddr = config
            .metrics
            .listen
            .parse()
            .map_err(|e| anyhow!("Invalid metrics address {}: {}", config.metrics.listen, e))?;
        init_metrics(addr)?;
    }

    let state = build_state(&config).await?;
    let app = create_router(state);

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// 离线校验规则脚本文件
pub fn validate_rule_file(compiler: &RuleCompiler, path: &Path) -> Result<Vec<ValidationError>> {
    let code = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;

    Ok(match compiler.compile(&code) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    })
}
