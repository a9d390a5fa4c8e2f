use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::AuthError;
use crate::session::{Principal, SessionVerifier};

/// JWT 会话校验
pub struct JwtSessionVerifier {
    secret: Arc<String>,
    expiration: Duration,
}

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,          // 用户 ID
    pub domains: Vec<String>, // 可管理域名
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl JwtSessionVerifier {
    pub fn new(secret: impl Into<String>, expiration_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            expiration: Duration::hours(expiration_hours),
        }
    }

    /// 签发 Token（运维工具与测试使用）
    pub fn issue_token(&self, user_id: &str, domains: Vec<String>) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            domains,
            exp: (now + self.expiration).timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidToken(e.to_string()),
        })?;

        if data.claims.exp < Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(data.claims)
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.decode_claims(token)?;
        debug!(user_id = %claims.sub, domains = claims.domains.len(), "Session verified");
        Ok(Principal::new(claims.sub, claims.domains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_and_verify() {
        let verifier = JwtSessionVerifier::new("test-secret", 1);
        let token = verifier
            .issue_token("user123", vec!["example.com".to_string()])
            .unwrap();

        let principal = verifier.verify(&token).await.unwrap();
        assert_eq!(principal.user_id, "user123");
        assert_eq!(principal.domains, vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let issuer = JwtSessionVerifier::new("secret-a", 1);
        let verifier = JwtSessionVerifier::new("secret-b", 1);
        let token = issuer.issue_token("user123", vec![]).unwrap();

        assert!(matches!(
            verifier.verify(&token).await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let verifier = JwtSessionVerifier::new("test-secret", -2);
        let token = verifier.issue_token("user123", vec![]).unwrap();

        assert_eq!(verifier.verify(&token).await, Err(AuthError::Expired));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let verifier = JwtSessionVerifier::new("test-secret", 1);
        assert!(verifier.verify("invalid-token").await.is_err());
    }
}
