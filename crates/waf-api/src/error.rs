use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use waf_middleware::AuthError;
use waf_rule::RuleError;
use waf_script::ValidationError;

/// API 错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    /// 规则校验失败
    #[error("Validation failed")]
    Validation(Vec<ValidationError>),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 规则集已变化
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 存储不可用
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(errors) => json!({ "errors": errors }),
            other => {
                if status.is_server_error() {
                    error!(status = status.as_u16(), "{}", other);
                }
                json!({
                    "error": other.to_string(),
                    "status": status.as_u16(),
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<RuleError> for ApiError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Validation(errors) => ApiError::Validation(errors),
            RuleError::NotFound(id) => ApiError::NotFound(id),
            RuleError::Conflict(msg) => ApiError::Conflict(msg),
            RuleError::Store(msg) => ApiError::Unavailable(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err.status() {
            StatusCode::FORBIDDEN => ApiError::Forbidden(err.to_string()),
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(err.to_string()),
            _ => ApiError::Unavailable(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
