//! Cache key schema
//!
//! Every key written by a [`KeyedCache`](crate::KeyedCache) is scoped by the
//! cache's namespace so that several caches can share one backend.
//! Key format: v{VERSION}:{namespace}:{key}

/// Cache schema version - increment when changing key formats or cached value shapes
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Key for a lookup key inside a namespace
    /// Format: v1:{namespace}:{key}
    pub fn scoped(namespace: &str, key: &str) -> String {
        format!("v{}:{}:{}", CACHE_VERSION, namespace, key)
    }

    /// Prefix shared by every key of a namespace
    pub fn namespace_prefix(namespace: &str) -> String {
        format!("v{}:{}:", CACHE_VERSION, namespace)
    }

    /// SCAN pattern matching every key of a namespace
    pub fn namespace_pattern(namespace: &str) -> String {
        format!("{}*", Self::namespace_prefix(namespace))
    }
}
