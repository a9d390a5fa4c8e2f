use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// 已验证的会话主体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    /// 可管理的域名
    pub domains: Vec<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, domains: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            domains,
        }
    }

    pub fn can_manage(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }

    pub fn authorize(&self, domain: &str) -> Result<(), AuthError> {
        if self.can_manage(domain) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(domain.to_string()))
        }
    }
}

/// 会话服务
///
/// Token issuance lives elsewhere; the API only needs to turn a bearer token
/// into a principal.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}
