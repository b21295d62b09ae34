use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment error: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub lineup: AssemblyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `SERVICE_*`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

/// `LOG_*`
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// `STORE_*`
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub fixture_path: Option<String>,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_candidates_table")]
    pub candidates_table: String,
    #[serde(default = "default_candidates_index")]
    pub candidates_index: String,
    #[serde(default = "default_recommendation_metrics_table")]
    pub recommendation_metrics_table: String,
    #[serde(default = "default_slate_metrics_table")]
    pub slate_metrics_table: String,
    #[serde(default = "default_topic_profiles_table")]
    pub topic_profiles_table: String,
}

/// `CACHE_*`
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_metrics_ttl_secs")]
    pub metrics_ttl_secs: u64,
    #[serde(default = "default_candidate_sets_ttl_secs")]
    pub candidate_sets_ttl_secs: u64,
}

impl CacheConfig {
    pub fn metrics_ttl(&self) -> Duration {
        Duration::from_secs(self.metrics_ttl_secs)
    }

    pub fn candidate_sets_ttl(&self) -> Duration {
        Duration::from_secs(self.candidate_sets_ttl_secs)
    }
}

/// `LINEUP_*`
#[derive(Debug, Clone, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "default_experiments_path")]
    pub experiments_path: String,
    #[serde(default = "default_recommendation_source")]
    pub recommendation_source: String,
    #[serde(default)]
    pub qa_user_ids: Vec<String>,
    /// JSON object of slate config id to replacement id
    #[serde(default)]
    pub qa_slate_map: Option<String>,
}

impl AssemblyConfig {
    pub fn qa_slate_map(&self) -> Result<HashMap<String, String>, ConfigError> {
        match self.qa_slate_map.as_deref().map(str::trim) {
            None | Some("") => Ok(HashMap::new()),
            Some(json) => serde_json::from_str(json).map_err(|e| {
                ConfigError::Invalid(format!("LINEUP_QA_SLATE_MAP is not a JSON object: {}", e))
            }),
        }
    }
}

fn default_service_name() -> String {
    "lineup-service".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_candidates_table() -> String {
    "lineup_candidate_sets".to_string()
}

fn default_candidates_index() -> String {
    "id-version".to_string()
}

fn default_recommendation_metrics_table() -> String {
    "recommendation_metrics".to_string()
}

fn default_slate_metrics_table() -> String {
    "slate_metrics".to_string()
}

fn default_topic_profiles_table() -> String {
    "topic_profiles".to_string()
}

fn default_metrics_ttl_secs() -> u64 {
    lineup_cache::ttl::METRICS.as_secs()
}

fn default_candidate_sets_ttl_secs() -> u64 {
    lineup_cache::ttl::CANDIDATE_SETS.as_secs()
}

fn default_experiments_path() -> String {
    "config/experiments.json".to_string()
}

fn default_recommendation_source() -> String {
    "RecommendationAPI".to_string()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build from explicit `(KEY, VALUE)` pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();

        let config = Config {
            service: envy::prefixed("SERVICE_").from_iter(vars.clone())?,
            logging: envy::prefixed("LOG_").from_iter(vars.clone())?,
            store: envy::prefixed("STORE_").from_iter(vars.clone())?,
            cache: envy::prefixed("CACHE_").from_iter(vars.clone())?,
            lineup: envy::prefixed("LINEUP_").from_iter(vars)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.metrics_ttl_secs == 0 || self.cache.candidate_sets_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache TTLs must be positive".to_string()));
        }
        if self.lineup.recommendation_source.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "LINEUP_RECOMMENDATION_SOURCE must not be empty".to_string(),
            ));
        }
        self.lineup.qa_slate_map()?;
        Ok(())
    }
}
