use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::naming::ROOT_SLUG;

/// 规则状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Enabled,
    Disabled,
}

impl RuleStatus {
    pub fn is_enabled(self) -> bool {
        matches!(self, RuleStatus::Enabled)
    }
}

impl Default for RuleStatus {
    fn default() -> Self {
        RuleStatus::Enabled
    }
}

impl From<bool> for RuleStatus {
    fn from(enabled: bool) -> Self {
        if enabled {
            RuleStatus::Enabled
        } else {
            RuleStatus::Disabled
        }
    }
}

/// WAF 规则定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// 规则 ID，创建后不可变
    pub id: String,

    /// 所属域名
    pub domain: String,

    /// 作用范围（`@` 表示根）
    pub slug: String,

    pub name: String,

    pub description: String,

    /// 规则脚本
    pub code: String,

    pub status: RuleStatus,

    /// 在域名规则集中的位置，0..n-1 连续
    pub order: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub author: String,
}

impl Rule {
    /// Builds the persisted form of an accepted draft at position `order`.
    pub fn from_draft(domain: &str, draft: RuleDraft, order: u32) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            domain: domain.to_string(),
            slug: draft.slug,
            name: draft.name,
            description: draft.description,
            code: draft.code,
            status: RuleStatus::Enabled,
            order,
            created_at: now,
            updated_at: now,
            author: draft.author,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }
}

/// 待校验的规则草稿
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default = "default_slug")]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub code: String,
    #[serde(default)]
    pub author: String,
}

fn default_slug() -> String {
    ROOT_SLUG.to_string()
}

impl RuleDraft {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: default_slug(),
            description: String::new(),
            code: code.into(),
            author: String::new(),
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

/// 规则局部更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub status: Option<RuleStatus>,
}

impl RulePatch {
    pub fn status(status: RuleStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.slug.is_none()
            && self.description.is_none()
            && self.code.is_none()
            && self.status.is_none()
    }
}

/// 持久化的域名规则集文档
///
/// `revision` increases by one on every successful mutation. Rules are kept
/// sorted by `order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDocument {
    pub domain: String,
    pub revision: u64,

    /// Domain-wide protection switch. When off, no rule runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub rules: Vec<Rule>,
}

fn default_enabled() -> bool {
    true
}

/// 域名防护状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    pub domain: String,
    pub enabled: bool,
    pub revision: u64,
    pub rule_count: usize,
    pub enabled_rule_count: usize,
}

impl RuleSetDocument {
    pub fn empty(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            revision: 0,
            enabled: true,
            rules: Vec::new(),
        }
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.id == id)
    }

    /// Rewrites `order` to match vector positions.
    pub fn renumber(&mut self) {
        for (index, rule) in self.rules.iter_mut().enumerate() {
            rule.order = index as u32;
        }
    }

    /// Successor document carrying `rules` at the next revision.
    pub fn next(&self, rules: Vec<Rule>) -> Self {
        let mut next = Self {
            domain: self.domain.clone(),
            revision: self.revision + 1,
            enabled: self.enabled,
            rules,
        };
        next.renumber();
        next
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_enabled())
    }

    pub fn status(&self) -> DomainStatus {
        DomainStatus {
            domain: self.domain.clone(),
            enabled: self.enabled,
            revision: self.revision,
            rule_count: self.rules.len(),
            enabled_rule_count: self.enabled().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> Rule {
        Rule::from_draft("example.com", RuleDraft::new(name, "pass()"), 0)
    }

    #[test]
    fn test_rule_serialization_uses_camel_case() {
        let rule = rule("r1");
        let json = serde_json::to_value(&rule).unwrap();

        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["status"], "enabled");
        assert_eq!(json["slug"], "@");
    }

    #[test]
    fn test_next_renumbers_and_bumps_revision() {
        let doc = RuleSetDocument::empty("example.com");
        let next = doc.next(vec![rule("a"), rule("b"), rule("c")]);

        assert_eq!(next.revision, 1);
        let orders: Vec<u32> = next.rules.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn test_protection_switch_defaults_on_and_carries_forward() {
        let stored = r#"{"domain":"example.com","revision":4,"rules":[]}"#;
        let mut doc: RuleSetDocument = serde_json::from_str(stored).unwrap();
        assert!(doc.enabled);

        doc.enabled = false;
        let next = doc.next(vec![rule("a")]);
        assert!(!next.enabled);

        let status = next.status();
        assert_eq!(status.revision, 5);
        assert_eq!(status.rule_count, 1);
        assert_eq!(status.enabled_rule_count, 1);
    }

    #[test]
    fn test_draft_defaults_slug_to_root() {
        let draft: RuleDraft =
            serde_json::from_str(r#"{"name":"n","code":"pass()"}"#).unwrap();
        assert_eq!(draft.slug, ROOT_SLUG);
    }
}
