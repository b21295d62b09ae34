//! In-process cache backend

use crate::{CacheBackend, CacheKey, CacheResult};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local backend. Expired entries are dropped lazily on read.
///
/// Uses tokio's clock, so paused-time tests control expiry.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Entry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        }

        // Expired: only remove if nobody refreshed it in the meantime
        if self
            .entries
            .remove_if(key, |_, entry| entry.expires_at <= now)
            .is_some()
        {
            debug!(key = %key, "Purged expired cache entry");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> CacheResult<usize> {
        let prefix = CacheKey::namespace_prefix(namespace);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let backend = MemoryBackend::new();
        backend
            .set("v1:ns:a", "1", Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(backend.get("v1:ns:a").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(backend.get("v1:ns:a").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_delete_namespace_only_touches_namespace() {
        let backend = MemoryBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set(&CacheKey::scoped("a", "1"), "x", ttl).await.unwrap();
        backend.set(&CacheKey::scoped("a", "2"), "y", ttl).await.unwrap();
        backend.set(&CacheKey::scoped("ab", "1"), "z", ttl).await.unwrap();

        let removed = backend.delete_namespace("a").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(backend.len(), 1);
        assert!(backend
            .get(&CacheKey::scoped("ab", "1"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_delete_single_key() {
        let backend = MemoryBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set("v1:ns:a", "1", ttl).await.unwrap();
        backend.set("v1:ns:b", "2", ttl).await.unwrap();

        backend.delete("v1:ns:a").await.unwrap();
        backend.delete("v1:ns:missing").await.unwrap();

        assert_eq!(backend.get("v1:ns:a").await.unwrap(), None);
        assert_eq!(backend.len(), 1);
    }
}
