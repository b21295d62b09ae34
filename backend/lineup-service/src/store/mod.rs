//! Key-value document store access
//!
//! Tables hold JSON records addressed by a partition key and an optional sort
//! key. Secondary indexes group records under another partition key and order
//! them by a sort attribute.

mod memory;
mod redis_store;

pub use self::memory::{IndexSchema, MemoryStore, TableSchema};
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Raw record as stored
pub type Record = Value;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown index {index} on table {table}")]
    UnknownIndex { table: String, index: String },

    #[error("malformed record: {0}")]
    Malformed(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Point lookup by primary key
    async fn get_item(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: Option<&str>,
    ) -> Result<Option<Record>, StoreError>;

    /// Records of one index partition, ordered by the index sort attribute
    async fn query(
        &self,
        table: &str,
        index: &str,
        partition_key: &str,
        limit: usize,
        scan_forward: bool,
    ) -> Result<Vec<Record>, StoreError>;

    /// Batched point lookups by partition key. Missing records are omitted.
    async fn get_items(
        &self,
        table: &str,
        partition_keys: &[String],
    ) -> Result<HashMap<String, Record>, StoreError> {
        let lookups = partition_keys.iter().map(|pk| async move {
            self.get_item(table, pk, None)
                .await
                .map(|record| (pk.clone(), record))
        });

        let found = try_join_all(lookups).await?;
        Ok(found
            .into_iter()
            .filter_map(|(pk, record)| record.map(|record| (pk, record)))
            .collect())
    }
}
