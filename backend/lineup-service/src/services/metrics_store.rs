use lineup_cache::KeyedCache;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{LineupError, Result};
use crate::models::MetricsAggregate;
use crate::store::StoreReader;

/// One cached fetch: the ids that were asked for and the aggregates found.
///
/// Remembering the requested ids lets a later call for a subset be answered
/// from cache even for ids that had no metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsBatch {
    requested: BTreeSet<String>,
    metrics: HashMap<String, MetricsAggregate>,
}

impl MetricsBatch {
    fn covers(&self, ids: &BTreeSet<String>) -> bool {
        ids.is_subset(&self.requested)
    }

    fn select(&self, ids: &BTreeSet<String>) -> HashMap<String, MetricsAggregate> {
        ids.iter()
            .filter_map(|id| self.metrics.get(id).map(|m| (id.clone(), m.clone())))
            .collect()
    }
}

/// Engagement aggregates per `(id, scope)`.
///
/// Records live under the partition key `"{id}/{scope}"`: item metrics are
/// scoped by slate, slate metrics by lineup. Results are cached per scope.
pub struct MetricsStore {
    store: Arc<dyn StoreReader>,
    table: String,
    cache: KeyedCache<MetricsBatch, LineupError>,
}

impl MetricsStore {
    pub fn new(
        store: Arc<dyn StoreReader>,
        table: impl Into<String>,
        cache: KeyedCache<MetricsBatch, LineupError>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            cache,
        }
    }

    pub fn cache(&self) -> &KeyedCache<MetricsBatch, LineupError> {
        &self.cache
    }

    pub fn record_key(id: &str, scope: &str) -> String {
        format!("{}/{}", id, scope)
    }

    /// Aggregates for `ids` in `scope`. Ids without data are absent from the result.
    pub async fn get(&self, scope: &str, ids: &[String]) -> Result<HashMap<String, MetricsAggregate>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let wanted: BTreeSet<String> = ids.iter().cloned().collect();
        let store = Arc::clone(&self.store);
        let table = self.table.clone();
        let scope_owned = scope.to_string();
        let fetch_ids = wanted.clone();

        let batch = self
            .cache
            .get_or_fetch_where(
                scope,
                |cached: &MetricsBatch| cached.covers(&wanted),
                move || async move { fetch_batch(store, table, scope_owned, fetch_ids).await },
            )
            .await?;

        Ok(batch.select(&wanted))
    }
}

async fn fetch_batch(
    store: Arc<dyn StoreReader>,
    table: String,
    scope: String,
    ids: BTreeSet<String>,
) -> Result<MetricsBatch> {
    let keys: Vec<String> = ids
        .iter()
        .map(|id| MetricsStore::record_key(id, &scope))
        .collect();
    let mut records = store.get_items(&table, &keys).await?;

    let mut metrics = HashMap::with_capacity(records.len());
    for (id, key) in ids.iter().zip(&keys) {
        let Some(record) = records.remove(key) else {
            continue;
        };
        match serde_json::from_value::<MetricsAggregate>(record) {
            Ok(mut aggregate) => {
                aggregate.key = key.clone();
                metrics.insert(id.clone(), aggregate);
            }
            Err(e) => warn!(table = %table, key = %key, error = %e, "Skipping malformed metrics record"),
        }
    }

    debug!(
        table = %table,
        scope = %scope,
        requested = ids.len(),
        found = metrics.len(),
        "Fetched metrics"
    );

    Ok(MetricsBatch {
        requested: ids,
        metrics,
    })
}
