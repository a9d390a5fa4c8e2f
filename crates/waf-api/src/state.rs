use std::sync::Arc;
use waf_middleware::SessionVerifier;
use waf_rule::{PipelineCoordinator, RuleStore};

/// API 应用状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RuleStore>,
    pub pipeline: Arc<PipelineCoordinator>,
    /// 会话校验
    pub verifier: Arc<dyn SessionVerifier>,
}

impl AppState {
    pub fn new(
        store: Arc<RuleStore>,
        pipeline: Arc<PipelineCoordinator>,
        verifier: Arc<dyn SessionVerifier>,
    ) -> Self {
        Self {
            store,
            pipeline,
            verifier,
        }
    }
}
