//! Cache metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    coalesced: CounterVec,
    fetches: CounterVec,
    fetch_errors: CounterVec,
    writes: CounterVec,
    invalidations: CounterVec,
    errors: CounterVec,
}

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    CounterVec::new(Opts::new(name, help), labels).expect("valid metric definition")
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: counter("lineup_cache_hits_total", "Total cache hits", &["namespace"]),
            misses: counter(
                "lineup_cache_misses_total",
                "Total cache misses",
                &["namespace"],
            ),
            coalesced: counter(
                "lineup_cache_coalesced_total",
                "Callers that joined an in-flight fetch",
                &["namespace"],
            ),
            fetches: counter(
                "lineup_cache_fetches_total",
                "Backend fetches started by the cache",
                &["namespace"],
            ),
            fetch_errors: counter(
                "lineup_cache_fetch_errors_total",
                "Backend fetches that failed",
                &["namespace"],
            ),
            writes: counter(
                "lineup_cache_writes_total",
                "Total cache writes",
                &["namespace"],
            ),
            invalidations: counter(
                "lineup_cache_invalidations_total",
                "Total namespace invalidations",
                &["namespace"],
            ),
            errors: counter(
                "lineup_cache_errors_total",
                "Total cache backend errors",
                &["namespace", "error_type"],
            ),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.coalesced.clone()))?;
        registry.register(Box::new(self.fetches.clone()))?;
        registry.register(Box::new(self.fetch_errors.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper, labelled by cache namespace
#[derive(Clone, Debug)]
pub struct CacheMetrics {
    namespace: String,
}

impl CacheMetrics {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self) {
        get_metrics()
            .hits
            .with_label_values(&[&self.namespace])
            .inc();
    }

    pub fn record_miss(&self) {
        get_metrics()
            .misses
            .with_label_values(&[&self.namespace])
            .inc();
    }

    pub fn record_coalesced(&self) {
        get_metrics()
            .coalesced
            .with_label_values(&[&self.namespace])
            .inc();
    }

    pub fn record_fetch(&self) {
        get_metrics()
            .fetches
            .with_label_values(&[&self.namespace])
            .inc();
    }

    pub fn record_fetch_error(&self) {
        get_metrics()
            .fetch_errors
            .with_label_values(&[&self.namespace])
            .inc();
    }

    pub fn record_write(&self) {
        get_metrics()
            .writes
            .with_label_values(&[&self.namespace])
            .inc();
    }

    pub fn record_invalidation(&self) {
        get_metrics()
            .invalidations
            .with_label_values(&[&self.namespace])
            .inc();
    }

    pub fn record_error(&self, error_type: &str) {
        get_metrics()
            .errors
            .with_label_values(&[&self.namespace, error_type])
            .inc();
    }
}
