use futures::future::join_all;
use lineup_cache::KeyedCache;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{LineupError, Result};
use crate::models::CandidateSet;
use crate::store::StoreReader;

/// Latest version of each candidate set, read through a cache.
pub struct CandidateSetStore {
    store: Arc<dyn StoreReader>,
    table: String,
    index: String,
    cache: KeyedCache<CandidateSet, LineupError>,
}

impl CandidateSetStore {
    pub fn new(
        store: Arc<dyn StoreReader>,
        table: impl Into<String>,
        index: impl Into<String>,
        cache: KeyedCache<CandidateSet, LineupError>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            index: index.into(),
            cache,
        }
    }

    pub fn cache(&self) -> &KeyedCache<CandidateSet, LineupError> {
        &self.cache
    }

    /// Newest version of candidate set `id`.
    ///
    /// `NotFound` when the set has no version at all. Misses are not cached.
    pub async fn get(&self, id: &str) -> Result<CandidateSet> {
        let store = Arc::clone(&self.store);
        let table = self.table.clone();
        let index = self.index.clone();
        let set_id = id.to_string();

        self.cache
            .get_or_fetch(id, move || async move {
                let latest = store.query(&table, &index, &set_id, 1, false).await?;
                let record = latest.into_iter().next().ok_or_else(|| {
                    LineupError::NotFound(format!("candidate set {}", set_id))
                })?;

                let set: CandidateSet = serde_json::from_value(record).map_err(|e| {
                    LineupError::Internal(format!("malformed candidate set {}: {}", set_id, e))
                })?;

                debug!(
                    candidate_set = %set_id,
                    version = ?set.version,
                    candidates = set.candidates.len(),
                    "Loaded candidate set"
                );
                Ok(set)
            })
            .await
    }

    /// Candidate sets by id. Sets that do not exist are left out.
    pub async fn get_many(&self, ids: &[String]) -> Result<HashMap<String, CandidateSet>> {
        let results = join_all(ids.iter().map(|id| self.get(id))).await;

        let mut found = HashMap::with_capacity(ids.len());
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(set) => {
                    found.insert(id.clone(), set);
                }
                Err(LineupError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }
}
