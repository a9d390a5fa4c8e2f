use serde::{Deserialize, Serialize};
use waf_types::{RequestContext, RuleDraft, ROOT_SLUG};

/// 规则创建请求
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub code: String,
}

impl CreateRuleRequest {
    pub fn into_draft(self, author: &str) -> RuleDraft {
        RuleDraft {
            name: self.name,
            slug: self
                .slug
                .filter(|slug| !slug.trim().is_empty())
                .unwrap_or_else(|| ROOT_SLUG.to_string()),
            description: self.description,
            code: self.code,
            author: author.to_string(),
        }
    }
}

/// 重排请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub ordered_ids: Vec<String>,
}

/// 域名防护开关
#[derive(Debug, Deserialize)]
pub struct DomainToggleRequest {
    pub enabled: bool,
}

/// 规则试运行请求
#[derive(Debug, Deserialize)]
pub struct TestRuleRequest {
    pub code: String,
    /// 缺省为 `GET /`
    pub context: Option<RequestContext>,
}

#[derive(Debug, Deserialize)]
pub struct FaultQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: String,
    pub deleted: bool,
}
