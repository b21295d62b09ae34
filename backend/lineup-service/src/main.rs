use actix_web::{web, App, HttpServer};
use anyhow::Context;
use lineup_cache::{CacheBackend, CacheMetrics, KeyedCache, MemoryBackend, RedisBackend};
use lineup_service::{
    config::{Backend, Config, LogFormat},
    handlers::{self, AppState},
    rankers::Sampler,
    services::{
        CandidateSetStore, ExperimentCatalog, LineupService, MetricsStore, QaOverrides,
        SlateAssembler, StoreTopicProfiles,
    },
    store::{MemoryStore, RedisStore, StoreReader},
};
use prometheus::Registry;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,actix_web=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn StoreReader>> {
    let store: Arc<dyn StoreReader> = match config.store.backend {
        Backend::Memory => match &config.store.fixture_path {
            Some(path) => Arc::new(MemoryStore::from_fixture_file(path)?),
            None => {
                warn!("STORE_FIXTURE_PATH not set, starting with an empty in-memory store");
                Arc::new(MemoryStore::new())
            }
        },
        Backend::Redis => Arc::new(
            RedisStore::connect(&config.store.redis_url)
                .await
                .context("Failed to connect store to Redis")?,
        ),
    };
    Ok(store)
}

async fn build_cache_backend(config: &Config) -> anyhow::Result<Arc<dyn CacheBackend>> {
    let backend: Arc<dyn CacheBackend> = match config.cache.backend {
        Backend::Memory => Arc::new(MemoryBackend::new()),
        Backend::Redis => Arc::new(
            RedisBackend::connect(&config.cache.redis_url)
                .await
                .context("Failed to connect cache to Redis")?,
        ),
    };
    Ok(backend)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.logging.format);

    info!(
        "Starting {} v{} on HTTP:{}",
        config.service.name,
        env!("CARGO_PKG_VERSION"),
        config.service.http_port
    );

    let registry = Registry::new();
    CacheMetrics::register(&registry).context("Failed to register cache metrics")?;

    let store = build_store(&config).await?;
    let cache_backend = build_cache_backend(&config).await?;

    let catalog = Arc::new(
        ExperimentCatalog::from_file(&config.lineup.experiments_path)
            .context("Failed to load experiment catalog")?,
    );
    let sampler = Arc::new(Sampler::from_entropy());

    let candidate_sets = Arc::new(CandidateSetStore::new(
        Arc::clone(&store),
        config.store.candidates_table.clone(),
        config.store.candidates_index.clone(),
        KeyedCache::new(
            "candidate_sets",
            Arc::clone(&cache_backend),
            config.cache.candidate_sets_ttl(),
        ),
    ));
    let recommendation_metrics = Arc::new(MetricsStore::new(
        Arc::clone(&store),
        config.store.recommendation_metrics_table.clone(),
        KeyedCache::new(
            "recommendation_metrics",
            Arc::clone(&cache_backend),
            config.cache.metrics_ttl(),
        ),
    ));
    let slate_metrics = Arc::new(MetricsStore::new(
        Arc::clone(&store),
        config.store.slate_metrics_table.clone(),
        KeyedCache::new(
            "slate_metrics",
            Arc::clone(&cache_backend),
            config.cache.metrics_ttl(),
        ),
    ));
    let topic_profiles = Arc::new(StoreTopicProfiles::new(
        Arc::clone(&store),
        config.store.topic_profiles_table.clone(),
    ));

    let qa = QaOverrides::new(
        config.lineup.qa_user_ids.clone(),
        config.lineup.qa_slate_map()?,
    );
    if !qa.is_empty() {
        info!("QA slate overrides enabled");
    }

    let slates = Arc::new(SlateAssembler::new(
        candidate_sets,
        recommendation_metrics,
        Arc::clone(&sampler),
        config.lineup.recommendation_source.clone(),
    ));
    let lineups = Arc::new(LineupService::new(
        catalog,
        slates,
        slate_metrics,
        topic_profiles,
        qa,
        sampler,
    ));

    let state = web::Data::new(AppState { lineups, registry });
    let port = config.service.http_port;

    info!("HTTP server listening on 0.0.0.0:{}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(actix_web::middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
