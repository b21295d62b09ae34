//! Lineup caching layer
//!
//! Provides the read-through cache used by the lineup services with:
//! - Single-flight fetch coalescing per key (concurrent misses share one fetch)
//! - TTL-bound entries, no negative caching
//! - Namespaced keys so several caches can share one backend
//! - Pluggable backends: in-process ([`MemoryBackend`]) or Redis ([`RedisBackend`])
//! - Metrics integration

mod error;
mod keyed;
mod keys;
mod memory;
mod metrics;
mod redis_backend;

pub use error::{CacheError, CacheResult};
pub use keyed::KeyedCache;
pub use keys::{CacheKey, CACHE_VERSION};
pub use memory::MemoryBackend;
pub use metrics::CacheMetrics;
pub use redis_backend::RedisBackend;

use std::time::Duration;

/// Default TTL values
pub mod ttl {
    use std::time::Duration;

    pub const METRICS: Duration = Duration::from_secs(300); // 5 minutes
    pub const CANDIDATE_SETS: Duration = Duration::from_secs(900); // 15 minutes
}

/// Storage behind a [`KeyedCache`].
///
/// Values are opaque serialized strings. Backends only store and expire them;
/// fetch coalescing is enforced by `KeyedCache`, never assumed from the backend.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live value, `None` on miss or expiry
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value that expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Delete one key; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every key of a namespace, returning the number removed
    async fn delete_namespace(&self, namespace: &str) -> CacheResult<usize>;
}
