use crate::{error::Result, models::DomainToggleRequest, state::AppState};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use tracing::info;
use waf_middleware::Principal;
use waf_types::DomainStatus;

/// 域名防护状态
pub async fn get_domain(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(domain): Path<String>,
) -> Result<Json<DomainStatus>> {
    principal.authorize(&domain)?;

    let status = state.store.domain_status(&domain).await?;
    Ok(Json(status))
}

/// 开启/关闭域名防护
pub async fn set_domain(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(domain): Path<String>,
    Json(req): Json<DomainToggleRequest>,
) -> Result<Json<DomainStatus>> {
    principal.authorize(&domain)?;
    info!(domain = %domain, enabled = req.enabled, user_id = %principal.user_id, "Switching domain protection");

    let status = state.store.set_domain_enabled(&domain, req.enabled).await?;
    Ok(Json(status))
}
