use crate::{error::ApiError, error::Result, models::*, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::{debug, info};
use waf_middleware::Principal;
use waf_rule::TestResult;
use waf_types::{RequestContext, Rule, RulePatch};

/// 列出规则（按顺序）
pub async fn list_rules(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(domain): Path<String>,
) -> Result<Json<Vec<Rule>>> {
    principal.authorize(&domain)?;
    debug!(domain = %domain, "Listing rules");

    let rules = state.store.list(&domain).await?;
    Ok(Json(rules))
}

/// 创建规则
pub async fn create_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(domain): Path<String>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<Rule>)> {
    principal.authorize(&domain)?;
    info!(domain = %domain, name = %req.name, user_id = %principal.user_id, "Creating rule");

    let rule = state
        .store
        .create(&domain, req.into_draft(&principal.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// 获取规则
pub async fn get_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((domain, id)): Path<(String, String)>,
) -> Result<Json<Rule>> {
    principal.authorize(&domain)?;

    let rule = state.store.get(&domain, &id).await?;
    Ok(Json(rule))
}

/// 更新或启停规则
pub async fn update_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((domain, id)): Path<(String, String)>,
    Json(patch): Json<RulePatch>,
) -> Result<Json<Rule>> {
    principal.authorize(&domain)?;
    if patch.is_empty() {
        return Err(ApiError::BadRequest("empty patch".to_string()));
    }
    info!(domain = %domain, rule_id = %id, user_id = %principal.user_id, "Updating rule");

    let rule = match patch {
        RulePatch {
            status: Some(status),
            name: None,
            slug: None,
            description: None,
            code: None,
        } => {
            state
                .store
                .set_status(&domain, &id, status.is_enabled())
                .await?
        }
        patch => state.store.update(&domain, &id, patch).await?,
    };
    Ok(Json(rule))
}

/// 整体重排
pub async fn reorder_rules(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(domain): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Vec<Rule>>> {
    principal.authorize(&domain)?;
    info!(domain = %domain, count = req.ordered_ids.len(), user_id = %principal.user_id, "Reordering rules");

    let rules = state.store.reorder(&domain, &req.ordered_ids).await?;
    Ok(Json(rules))
}

/// 删除规则
pub async fn delete_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((domain, id)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    principal.authorize(&domain)?;
    info!(domain = %domain, rule_id = %id, user_id = %principal.user_id, "Deleting rule");

    state.store.delete(&domain, &id).await?;
    Ok(Json(DeleteResponse { id, deleted: true }))
}

/// 试运行未保存的规则
pub async fn test_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(domain): Path<String>,
    Json(req): Json<TestRuleRequest>,
) -> Result<Json<TestResult>> {
    principal.authorize(&domain)?;
    let ctx = req
        .context
        .unwrap_or_else(|| RequestContext::new("GET", domain.as_str(), "/"));

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.test_rule(&domain, &req.code, &ctx))
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?
        .map_err(ApiError::Validation)?;
    Ok(Json(result))
}
