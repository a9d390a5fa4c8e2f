use chrono::Utc;
use dashmap::DashMap;
use metrics::gauge;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use waf_script::RuleCompiler;
use waf_types::{
    validate_domain, validate_slug, DomainStatus, Rule, RuleDraft, RulePatch, RuleSetDocument,
    RuleStatus,
};

use crate::error::{Result, RuleError};
use crate::repository::RuleRepository;

const MAX_NAME_LEN: usize = 128;
const MAX_DESCRIPTION_LEN: usize = 2048;

/// 规则存储参数
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// How long a pipeline snapshot is served before the repository is asked again.
    pub snapshot_ttl: Duration,

    /// Age at which a snapshot that could not be refreshed raises an alarm.
    pub staleness_alarm: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(1),
            staleness_alarm: Duration::from_secs(60),
        }
    }
}

struct CachedSnapshot {
    document: Arc<RuleSetDocument>,
    fetched_at: Instant,
    attempted_at: Instant,
}

/// 域名规则存储
///
/// Mutations for one domain are serialized by a per-domain lock; each builds
/// the complete successor document, persists it, then swaps the cached
/// snapshot. Pipelines only ever clone an `Arc` of a finished document.
pub struct RuleStore {
    repository: Arc<dyn RuleRepository>,
    compiler: Arc<RuleCompiler>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    snapshots: RwLock<HashMap<String, CachedSnapshot>>,
    options: StoreOptions,
}

impl RuleStore {
    pub fn new(repository: Arc<dyn RuleRepository>, compiler: Arc<RuleCompiler>) -> Self {
        Self::with_options(repository, compiler, StoreOptions::default())
    }

    pub fn with_options(
        repository: Arc<dyn RuleRepository>,
        compiler: Arc<RuleCompiler>,
        options: StoreOptions,
    ) -> Self {
        Self {
            repository,
            compiler,
            locks: DashMap::new(),
            snapshots: RwLock::new(HashMap::new()),
            options,
        }
    }

    pub fn compiler(&self) -> &Arc<RuleCompiler> {
        &self.compiler
    }

    /// 按顺序列出域名规则
    pub async fn list(&self, domain: &str) -> Result<Vec<Rule>> {
        let document = self.load(domain).await?;
        let document = self.install(Arc::new(document)).await;
        Ok(document.rules.clone())
    }

    pub async fn get(&self, domain: &str, id: &str) -> Result<Rule> {
        let document = self.load(domain).await?;
        document
            .rules
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| RuleError::NotFound(id.to_string()))
    }

    /// 创建规则：校验通过后追加到末尾
    pub async fn create(&self, domain: &str, draft: RuleDraft) -> Result<Rule> {
        validate_domain(domain).map_err(|e| RuleError::invalid_field("domain", e))?;
        check_fields(Some(&draft.name), Some(&draft.slug), Some(&draft.description))?;
        self.compiler
            .compile(&draft.code)
            .map_err(RuleError::Validation)?;

        let (id, document) = self
            .mutate(domain, move |current| {
                let rule = Rule::from_draft(domain, draft, current.rules.len() as u32);
                let id = rule.id.clone();
                let mut rules = current.rules.clone();
                rules.push(rule);
                Ok((rules, id))
            })
            .await?;

        let rule = find(&document, &id)?;
        info!(domain = %domain, rule_id = %rule.id, rule_name = %rule.name, order = rule.order, "Rule created");
        Ok(rule)
    }

    /// 局部更新；修改脚本时重新校验
    pub async fn update(&self, domain: &str, id: &str, patch: RulePatch) -> Result<Rule> {
        validate_domain(domain).map_err(|e| RuleError::invalid_field("domain", e))?;
        check_fields(
            patch.name.as_ref(),
            patch.slug.as_ref(),
            patch.description.as_ref(),
        )?;
        if let Some(code) = &patch.code {
            self.compiler.compile(code).map_err(RuleError::Validation)?;
        }

        let (_, document) = self
            .mutate(domain, |current| {
                let index = current
                    .position(id)
                    .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
                let mut rules = current.rules.clone();
                let rule = &mut rules[index];
                if let Some(name) = patch.name {
                    rule.name = name;
                }
                if let Some(slug) = patch.slug {
                    rule.slug = slug;
                }
                if let Some(description) = patch.description {
                    rule.description = description;
                }
                if let Some(code) = patch.code {
                    rule.code = code;
                }
                if let Some(status) = patch.status {
                    rule.status = status;
                }
                rule.updated_at = Utc::now();
                Ok((rules, ()))
            })
            .await?;

        let rule = find(&document, id)?;
        info!(domain = %domain, rule_id = %id, "Rule updated");
        Ok(rule)
    }

    /// 启用/禁用规则，位置不变
    pub async fn set_status(&self, domain: &str, id: &str, enabled: bool) -> Result<Rule> {
        let status = RuleStatus::from(enabled);
        let (_, document) = self
            .mutate(domain, |current| {
                let index = current
                    .position(id)
                    .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
                let mut rules = current.rules.clone();
                rules[index].status = status;
                rules[index].updated_at = Utc::now();
                Ok((rules, ()))
            })
            .await?;

        let rule = find(&document, id)?;
        info!(domain = %domain, rule_id = %id, status = ?status, "Rule status changed");
        Ok(rule)
    }

    /// 整体重排
    ///
    /// `ordered_ids` must contain exactly the stored ids; any membership
    /// difference is a conflict and nothing changes.
    pub async fn reorder(&self, domain: &str, ordered_ids: &[String]) -> Result<Vec<Rule>> {
        let (_, document) = self
            .mutate(domain, |current| {
                let stored: HashSet<&str> = current.rules.iter().map(|r| r.id.as_str()).collect();
                let submitted: HashSet<&str> = ordered_ids.iter().map(String::as_str).collect();

                if submitted.len() != ordered_ids.len() {
                    return Err(RuleError::Conflict("duplicate rule ids".to_string()));
                }
                if stored != submitted {
                    let missing = stored.difference(&submitted).count();
                    let unknown = submitted.difference(&stored).count();
                    return Err(RuleError::Conflict(format!(
                        "stale rule set: {} missing, {} unknown",
                        missing, unknown
                    )));
                }

                let mut by_id: HashMap<&str, &Rule> =
                    current.rules.iter().map(|r| (r.id.as_str(), r)).collect();
                let rules = ordered_ids
                    .iter()
                    .filter_map(|id| by_id.remove(id.as_str()).cloned())
                    .collect();
                Ok((rules, ()))
            })
            .await?;

        info!(domain = %domain, count = document.rules.len(), "Rules reordered");
        Ok(document.rules.clone())
    }

    /// 删除规则并压缩顺序
    pub async fn delete(&self, domain: &str, id: &str) -> Result<()> {
        self.mutate(domain, |current| {
            let index = current
                .position(id)
                .ok_or_else(|| RuleError::NotFound(id.to_string()))?;
            let mut rules = current.rules.clone();
            rules.remove(index);
            Ok((rules, ()))
        })
        .await?;

        info!(domain = %domain, rule_id = %id, "Rule deleted");
        Ok(())
    }

    /// 域名级防护状态
    pub async fn domain_status(&self, domain: &str) -> Result<DomainStatus> {
        let document = self.load(domain).await?;
        let document = self.install(Arc::new(document)).await;
        Ok(document.status())
    }

    /// 开启/关闭整个域名的防护，规则本身保持不变
    pub async fn set_domain_enabled(&self, domain: &str, enabled: bool) -> Result<DomainStatus> {
        let (_, document) = self
            .commit(domain, |current| {
                let mut next = current.next(current.rules.clone());
                next.enabled = enabled;
                Ok((next, ()))
            })
            .await?;

        info!(domain = %domain, enabled, revision = document.revision, "Domain protection changed");
        Ok(document.status())
    }

    /// 流水线使用的只读快照
    ///
    /// Served from cache within the TTL. When the repository cannot be
    /// reached the last good snapshot keeps serving.
    pub async fn snapshot(&self, domain: &str) -> Result<Arc<RuleSetDocument>> {
        validate_domain(domain).map_err(|e| RuleError::invalid_field("domain", e))?;
        let cached = {
            let snapshots = self.snapshots.read().await;
            snapshots.get(domain).map(|c| {
                let fresh = c.fetched_at.elapsed() < self.options.snapshot_ttl
                    || c.attempted_at.elapsed() < self.options.snapshot_ttl;
                (c.document.clone(), c.fetched_at, fresh)
            })
        };

        if let Some((document, _, true)) = &cached {
            return Ok(document.clone());
        }

        match self.repository.load(domain).await {
            Ok(loaded) => {
                let loaded = loaded.unwrap_or_else(|| RuleSetDocument::empty(domain));
                gauge!("waf_snapshot_stale", 0.0, "domain" => domain.to_string());
                Ok(self.install(Arc::new(loaded)).await)
            }
            Err(e) => {
                let (document, fetched_at, _) = cached.ok_or(e)?;
                let age = fetched_at.elapsed();
                if let Some(c) = self.snapshots.write().await.get_mut(domain) {
                    c.attempted_at = Instant::now();
                }
                if age >= self.options.staleness_alarm {
                    gauge!("waf_snapshot_stale", 1.0, "domain" => domain.to_string());
                    error!(domain = %domain, age_secs = age.as_secs(), "Rule snapshot is stale beyond alarm threshold");
                } else {
                    warn!(domain = %domain, age_ms = age.as_millis() as u64, "Serving cached rule snapshot, store unavailable");
                }
                Ok(document)
            }
        }
    }

    async fn load(&self, domain: &str) -> Result<RuleSetDocument> {
        validate_domain(domain).map_err(|e| RuleError::invalid_field("domain", e))?;
        let mut document = self
            .repository
            .load(domain)
            .await?
            .unwrap_or_else(|| RuleSetDocument::empty(domain));
        document.rules.sort_by_key(|r| r.order);
        Ok(document)
    }

    async fn mutate<T, F>(&self, domain: &str, f: F) -> Result<(T, Arc<RuleSetDocument>)>
    where
        F: FnOnce(&RuleSetDocument) -> Result<(Vec<Rule>, T)>,
    {
        self.commit(domain, |current| {
            let (rules, value) = f(current)?;
            Ok((current.next(rules), value))
        })
        .await
    }

    /// Load, build the successor, persist and install, all under the domain lock.
    async fn commit<T, F>(&self, domain: &str, f: F) -> Result<(T, Arc<RuleSetDocument>)>
    where
        F: FnOnce(&RuleSetDocument) -> Result<(RuleSetDocument, T)>,
    {
        let lock = self
            .locks
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let current = self.load(domain).await?;
        let (next, value) = f(&current)?;
        let next = Arc::new(next);
        self.repository.save(&next).await?;
        let installed = self.install(next).await;
        Ok((value, installed))
    }

    /// Installs `document` unless a newer revision is already cached; returns
    /// whichever is current.
    async fn install(&self, document: Arc<RuleSetDocument>) -> Arc<RuleSetDocument> {
        let now = Instant::now();
        let mut snapshots = self.snapshots.write().await;
        match snapshots.get_mut(&document.domain) {
            Some(cached) if cached.document.revision > document.revision => {
                cached.document.clone()
            }
            Some(cached) => {
                cached.document = document.clone();
                cached.fetched_at = now;
                cached.attempted_at = now;
                document
            }
            None => {
                snapshots.insert(
                    document.domain.clone(),
                    CachedSnapshot {
                        document: document.clone(),
                        fetched_at: now,
                        attempted_at: now,
                    },
                );
                document
            }
        }
    }
}

fn find(document: &RuleSetDocument, id: &str) -> Result<Rule> {
    document
        .rules
        .iter()
        .find(|r| r.id == id)
        .cloned()
        .ok_or_else(|| RuleError::NotFound(id.to_string()))
}

fn check_fields(
    name: Option<&String>,
    slug: Option<&String>,
    description: Option<&String>,
) -> Result<()> {
    let mut errors = Vec::new();
    if let Some(name) = name {
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            errors.push(waf_script::ValidationError::field(
                "name",
                format!("must be 1..={} characters", MAX_NAME_LEN),
            ));
        }
    }
    if let Some(slug) = slug {
        if let Err(e) = validate_slug(slug) {
            errors.push(waf_script::ValidationError::field("slug", e));
        }
    }
    if let Some(description) = description {
        if description.len() > MAX_DESCRIPTION_LEN {
            errors.push(waf_script::ValidationError::field(
                "description",
                format!("must be at most {} characters", MAX_DESCRIPTION_LEN),
            ));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RuleError::Validation(errors))
    }
}
