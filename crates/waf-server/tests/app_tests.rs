use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use std::fs;
use tempfile::tempdir;
use tower::ServiceExt;
use waf_config::{DomainOverride, GlobalConfig, StoreBackend};
use waf_rule::FaultAction;
use waf_script::{RuleCompiler, ValidationErrorKind};
use waf_server::{build_state, validate_rule_file};
use waf_types::{Decision, FailPolicy, RequestContext, RuleDraft};

#[tokio::test]
async fn test_file_backend_survives_restart() {
    let data_dir = tempdir().unwrap();
    let mut config = GlobalConfig::default();
    config.store.backend = StoreBackend::File;
    config.store.data_dir = data_dir.path().to_path_buf();

    let state = build_state(&config).await.unwrap();
    let rule = state
        .store
        .create("example.com", RuleDraft::new("deny", "block(403)"))
        .await
        .unwrap();
    drop(state);

    let state = build_state(&config).await.unwrap();
    let rules = state.store.list("example.com").await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, rule.id);
}

#[tokio::test]
async fn test_domain_overrides_reach_pipeline() {
    let mut config = GlobalConfig::default();
    config.store.backend = StoreBackend::Memory;
    config.sandbox.timeout_ms = 2000;
    config.domains.insert(
        "open.example".to_string(),
        DomainOverride {
            fail_policy: Some(FailPolicy::Open),
            ..Default::default()
        },
    );

    let state = build_state(&config).await.unwrap();
    for domain in ["open.example", "closed.example"] {
        state
            .store
            .create(domain, RuleDraft::new("broken", r#"throw "boom""#))
            .await
            .unwrap();
    }

    let open = RequestContext::new("GET", "open.example", "/");
    assert_eq!(
        state.pipeline.evaluate("open.example", &open).await,
        Decision::Continue
    );
    let closed = RequestContext::new("GET", "closed.example", "/");
    assert_eq!(
        state.pipeline.evaluate("closed.example", &closed).await,
        Decision::Block {
            status: 503,
            body: "Service Unavailable".to_string(),
            headers: Default::default(),
        }
    );

    let faults = state.pipeline.recent_faults("open.example", 10).await;
    assert_eq!(faults[0].action, FaultAction::Skipped);
}

#[tokio::test]
async fn test_router_from_config() {
    let mut config = GlobalConfig::default();
    config.store.backend = StoreBackend::Memory;

    let app = waf_api::create_router(build_state(&config).await.unwrap());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn test_validate_rule_file() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.rhai");
    let bad = dir.path().join("bad.rhai");
    fs::write(&good, "if ctx.path == \"/admin\" { block(403) }").unwrap();
    fs::write(&bad, "let t = timestamp();\nblock(403)").unwrap();

    let compiler = RuleCompiler::default();
    assert!(validate_rule_file(&compiler, &good).unwrap().is_empty());

    let errors = validate_rule_file(&compiler, &bad).unwrap();
    assert_eq!(errors[0].kind, ValidationErrorKind::DisallowedIdentifier);
    assert_eq!(errors[0].line, Some(1));

    assert!(validate_rule_file(&compiler, &dir.path().join("missing.rhai")).is_err());
}
