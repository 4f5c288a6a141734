use std::num::NonZeroUsize;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::ai_types::InsightReport;

pub const DEFAULT_CACHE_CAPACITY: usize = 32;
pub const DEFAULT_CACHE_TTL_MINUTES: i64 = 30;

/// Cache identity built from the model name and the summary's semantic hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiCacheKey {
    model: String,
    semantic_hash: String,
}

impl AiCacheKey {
    pub fn new(model: impl Into<String>, semantic_hash: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            semantic_hash: semantic_hash.into(),
        }
    }

    pub fn semantic_hash(&self) -> &str {
        &self.semantic_hash
    }

    /// Stable key (base64 SHA-256 of model and hash).
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update(b":");
        hasher.update(self.semantic_hash.as_bytes());
        STANDARD_NO_PAD.encode(hasher.finalize())
    }
}

#[derive(Debug, Clone)]
struct CachedInsight {
    report: InsightReport,
    cached_at: DateTime<Utc>,
}

/// Bounded, time-limited memo of generated insight reports.
pub struct InsightCache {
    entries: Mutex<LruCache<String, CachedInsight>>,
    ttl: Duration,
}

impl InsightCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, key: &AiCacheKey) -> Option<InsightReport> {
        let cache_key = key.cache_key();
        let mut guard = self.entries.lock().ok()?;
        let entry = guard.get(&cache_key)?.clone();
        if Utc::now() - entry.cached_at > self.ttl {
            guard.pop(&cache_key);
            debug!(target: "app::ai::cache", "expired insight entry evicted");
            return None;
        }
        Some(entry.report)
    }

    pub fn put(&self, key: &AiCacheKey, report: InsightReport) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.put(
                key.cache_key(),
                CachedInsight {
                    report,
                    cached_at: Utc::now(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> usize {
        self.entries
            .lock()
            .map(|mut guard| {
                let cleared = guard.len();
                guard.clear();
                cleared
            })
            .unwrap_or(0)
    }
}

impl Default for InsightCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_CACHE_CAPACITY,
            Duration::minutes(DEFAULT_CACHE_TTL_MINUTES),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(headline: &str) -> InsightReport {
        InsightReport {
            headline: headline.to_string(),
            ..InsightReport::default()
        }
    }

    #[test]
    fn cache_key_depends_on_model_and_hash() {
        let base = AiCacheKey::new("deepseek-chat", "abc");
        assert_eq!(base.cache_key(), AiCacheKey::new("deepseek-chat", "abc").cache_key());
        assert_ne!(base.cache_key(), AiCacheKey::new("gpt-4o-mini", "abc").cache_key());
        assert_ne!(base.cache_key(), AiCacheKey::new("deepseek-chat", "abd").cache_key());
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let cache = InsightCache::new(2, Duration::minutes(5));
        let first = AiCacheKey::new("m", "1");
        let second = AiCacheKey::new("m", "2");
        let third = AiCacheKey::new("m", "3");

        cache.put(&first, report("one"));
        cache.put(&second, report("two"));
        assert!(cache.get(&first).is_some());
        cache.put(&third, report("three"));

        assert!(cache.get(&second).is_none());
        assert_eq!(cache.get(&first).map(|r| r.headline), Some("one".to_string()));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = InsightCache::new(4, Duration::seconds(-1));
        let key = AiCacheKey::new("m", "1");
        cache.put(&key, report("stale"));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }
}
