use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::compiler::CompiledRule;

/// 编译缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheInner {
    entries: HashMap<String, Arc<CompiledRule>>,
    // insertion order, oldest first
    order: VecDeque<String>,
}

/// Compiled artifacts keyed by source hash, evicted oldest-first once full.
pub struct CompileCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CompileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, hash: &str) -> Option<Arc<CompiledRule>> {
        let found = match self.inner.read() {
            Ok(inner) => inner.entries.get(hash).cloned(),
            Err(e) => {
                tracing::error!("Failed to acquire read lock in compile cache: {}", e);
                None
            }
        };
        match found {
            Some(rule) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(rule)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, rule: Arc<CompiledRule>) {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(e) => {
                tracing::error!("Failed to acquire write lock in compile cache: {}", e);
                return;
            }
        };
        if inner.entries.contains_key(&rule.hash) {
            return;
        }
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(rule.hash.clone());
        inner.entries.insert(rule.hash.clone(), rule);
    }

    pub fn stats(&self) -> CacheStats {
        let entries = match self.inner.read() {
            Ok(inner) => inner.entries.len(),
            Err(_) => 0,
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut inner) => {
                inner.entries.clear();
                inner.order.clear();
            }
            Err(e) => {
                tracing::error!("Failed to acquire write lock in compile cache: {}", e);
            }
        }
    }
}
