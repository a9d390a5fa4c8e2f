use crate::{error::Result, models::FaultQuery, state::AppState};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use waf_middleware::Principal;
use waf_rule::FaultRecord;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

/// 最近的规则运行故障
pub async fn list_faults(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(domain): Path<String>,
    Query(query): Query<FaultQuery>,
) -> Result<Json<Vec<FaultRecord>>> {
    principal.authorize(&domain)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.pipeline.recent_faults(&domain, limit).await))
}
