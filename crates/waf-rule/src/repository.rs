use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use waf_types::RuleSetDocument;

use crate::error::{Result, RuleError};

/// 规则集持久化后端
///
/// One document per domain. `save` replaces the whole document.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn load(&self, domain: &str) -> Result<Option<RuleSetDocument>>;

    async fn save(&self, document: &RuleSetDocument) -> Result<()>;
}

/// 规则存储（内存实现）
pub struct MemoryRuleRepository {
    documents: Arc<RwLock<HashMap<String, RuleSetDocument>>>,
}

impl MemoryRuleRepository {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryRuleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleRepository for MemoryRuleRepository {
    async fn load(&self, domain: &str) -> Result<Option<RuleSetDocument>> {
        let documents = self.documents.read().await;
        Ok(documents.get(domain).cloned())
    }

    async fn save(&self, document: &RuleSetDocument) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.insert(document.domain.clone(), document.clone());
        Ok(())
    }
}

/// 规则存储（JSON 文件实现）
///
/// Stores `<dir>/<domain>.json`. Writes go to a temporary file that is then
/// renamed over the old document, so readers see either version in full.
pub struct FileRuleRepository {
    dir: PathBuf,
}

impl FileRuleRepository {
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RuleError::store(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path_for(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("{}.json", domain))
    }
}

#[async_trait]
impl RuleRepository for FileRuleRepository {
    async fn load(&self, domain: &str) -> Result<Option<RuleSetDocument>> {
        let path = self.path_for(domain);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RuleError::store(format!("read {}: {}", path.display(), e))),
        };
        let document = serde_json::from_slice(&bytes)
            .map_err(|e| RuleError::store(format!("decode {}: {}", path.display(), e)))?;
        Ok(Some(document))
    }

    async fn save(&self, document: &RuleSetDocument) -> Result<()> {
        let path = self.path_for(&document.domain);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", document.domain, uuid::Uuid::new_v4()));

        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| RuleError::store(format!("encode {}: {}", document.domain, e)))?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| RuleError::store(format!("write {}: {}", tmp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RuleError::store(format!("rename {}: {}", path.display(), e)));
        }

        debug!(domain = %document.domain, revision = document.revision, "Rule set persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waf_types::{Rule, RuleDraft};

    fn document() -> RuleSetDocument {
        RuleSetDocument::empty("example.com").next(vec![
            Rule::from_draft("example.com", RuleDraft::new("a", "pass()"), 0),
            Rule::from_draft("example.com", RuleDraft::new("b", "allow()"), 1),
        ])
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let repo = MemoryRuleRepository::new();
        assert!(repo.load("example.com").await.unwrap().is_none());

        let doc = document();
        repo.save(&doc).await.unwrap();
        assert_eq!(repo.load("example.com").await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn test_file_repository_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let doc = document();

        {
            let repo = FileRuleRepository::new(dir.path()).await.unwrap();
            repo.save(&doc).await.unwrap();
        }

        let repo = FileRuleRepository::new(dir.path()).await.unwrap();
        let loaded = repo.load("example.com").await.unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert!(repo.load("other.com").await.unwrap().is_none());

        // no temporary files left behind
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["example.com.json".to_string()]);
    }

    #[tokio::test]
    async fn test_file_repository_reports_corrupt_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("example.com.json"), b"{not json").unwrap();

        let repo = FileRuleRepository::new(dir.path()).await.unwrap();
        assert!(matches!(
            repo.load("example.com").await,
            Err(RuleError::Store(_))
        ));
    }
}
