use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

use super::{Record, StoreError, StoreReader};

/// Store backed by Redis.
///
/// Key layout:
/// - record: `{table}:{partition_key}` or `{table}:{partition_key}:{sort_key}`, JSON string
/// - index partition: `{table}:{index}:{partition_key}`, sorted set of record keys
///   scored by the index sort attribute
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    pub fn record_key(table: &str, partition_key: &str, sort_key: Option<&str>) -> String {
        match sort_key {
            Some(sk) => format!("{}:{}:{}", table, partition_key, sk),
            None => format!("{}:{}", table, partition_key),
        }
    }

    pub fn index_key(table: &str, index: &str, partition_key: &str) -> String {
        format!("{}:{}:{}", table, index, partition_key)
    }

    async fn load(&self, keys: &[String]) -> Result<Vec<Option<Record>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        // MGET with a single key still returns a list
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;

        raw.into_iter()
            .map(|value| value.map(|json| parse_record(&json)).transpose())
            .collect()
    }
}

fn parse_record(json: &str) -> Result<Record, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Malformed(e.to_string()))
}

#[async_trait]
impl StoreReader for RedisStore {
    async fn get_item(
        &self,
        table: &str,
        partition_key: &str,
        sort_key: Option<&str>,
    ) -> Result<Option<Record>, StoreError> {
        let key = Self::record_key(table, partition_key, sort_key);
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(&key).await?;
        value.map(|json| parse_record(&json)).transpose()
    }

    async fn query(
        &self,
        table: &str,
        index: &str,
        partition_key: &str,
        limit: usize,
        scan_forward: bool,
    ) -> Result<Vec<Record>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let index_key = Self::index_key(table, index, partition_key);
        let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
        let mut conn = self.conn.clone();
        let keys: Vec<String> = if scan_forward {
            conn.zrange(&index_key, 0, stop).await?
        } else {
            conn.zrevrange(&index_key, 0, stop).await?
        };

        debug!(index = %index_key, matches = keys.len(), "Store query");

        // Index entries whose record expired are skipped
        Ok(self.load(&keys).await?.into_iter().flatten().collect())
    }

    async fn get_items(
        &self,
        table: &str,
        partition_keys: &[String],
    ) -> Result<HashMap<String, Record>, StoreError> {
        let keys: Vec<String> = partition_keys
            .iter()
            .map(|pk| Self::record_key(table, pk, None))
            .collect();
        let records = self.load(&keys).await?;

        Ok(partition_keys
            .iter()
            .cloned()
            .zip(records)
            .filter_map(|(pk, record)| record.map(|record| (pk, record)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            RedisStore::record_key("candidate_sets", "set-a", Some("3")),
            "candidate_sets:set-a:3"
        );
        assert_eq!(
            RedisStore::record_key("slate_metrics", "home/default", None),
            "slate_metrics:home/default"
        );
        assert_eq!(
            RedisStore::index_key("candidate_sets", "id-version", "set-a"),
            "candidate_sets:id-version:set-a"
        );
    }
}
