use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::error::AuthError;
use crate::session::SessionVerifier;

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// 会话认证中间件
///
/// Verified principals are put into the request extensions for handlers to
/// check domain scope.
pub async fn session_middleware(
    State(verifier): State<Arc<dyn SessionVerifier>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(req.headers()) {
        Ok(token) => token.to_string(),
        Err(e) => return reject(e),
    };

    match verifier.verify(&token).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => {
            debug!(error = %e, "Session rejected");
            reject(e)
        }
    }
}

fn reject(error: AuthError) -> Response {
    let status = error.status();
    (
        status,
        Json(json!({
            "error": error.to_string(),
            "status": status.as_u16(),
        })),
    )
        .into_response()
}
