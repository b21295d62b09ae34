use thiserror::Error;

/// Failure of the storage behind a cache.
///
/// Reads and writes that hit one of these degrade to a miss inside
/// [`KeyedCache`](crate::KeyedCache); only `clear` and backend construction
/// return them to callers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type CacheResult<T> = Result<T, CacheError>;
