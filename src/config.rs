use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::core::bandit::LearnerConfig;
use crate::core::explain::{DEFAULT_CONCERN_THRESHOLD, DEFAULT_STRENGTH_THRESHOLD};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub ranking: RankingSettings,
    #[serde(default)]
    pub learner: LearnerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

/// Redis is optional; without it query embeddings are not cached
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSettings {
    pub redis_url: Option<String>,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

/// Semantic retrieval is disabled when no endpoint is configured
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    pub dimensions: Option<usize>,
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: default_embedding_model(),
            dimensions: None,
            timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_timeout_ms() -> u64 { 2000 }

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_channel_timeout_ms")]
    pub channel_timeout_ms: u64,
    #[serde(default = "default_channel_limit")]
    pub channel_limit: usize,
    #[serde(default)]
    pub weights: ChannelWeights,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            channel_timeout_ms: default_channel_timeout_ms(),
            channel_limit: default_channel_limit(),
            weights: ChannelWeights::default(),
            max_candidates: default_max_candidates(),
        }
    }
}

fn default_channel_timeout_ms() -> u64 { 800 }
fn default_channel_limit() -> usize { 200 }
fn default_max_candidates() -> usize { 300 }

/// Blend weights for the merger, one per channel
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelWeights {
    #[serde(default = "default_structured_weight")]
    pub structured: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic: f64,
}

impl Default for ChannelWeights {
    fn default() -> Self {
        Self {
            structured: default_structured_weight(),
            keyword: default_keyword_weight(),
            semantic: default_semantic_weight(),
        }
    }
}

fn default_structured_weight() -> f64 { 0.5 }
fn default_keyword_weight() -> f64 { 0.2 }
fn default_semantic_weight() -> f64 { 0.3 }

#[derive(Debug, Clone, Deserialize)]
pub struct RankingSettings {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_strength_threshold")]
    pub strength_threshold: f64,
    #[serde(default = "default_concern_threshold")]
    pub concern_threshold: f64,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            strength_threshold: default_strength_threshold(),
            concern_threshold: default_concern_threshold(),
        }
    }
}

fn default_limit() -> usize { 20 }
fn default_max_limit() -> usize { 100 }
fn default_strength_threshold() -> f64 { DEFAULT_STRENGTH_THRESHOLD }
fn default_concern_threshold() -> f64 { DEFAULT_CONCERN_THRESHOLD }

#[derive(Debug, Clone, Deserialize)]
pub struct LearnerSettings {
    #[serde(default = "default_learner_enabled")]
    pub enabled: bool,
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_min_trial_increment")]
    pub min_trial_increment: f64,
    #[serde(default = "default_full_credit_threshold")]
    pub full_credit_threshold: f64,
    #[serde(default = "default_half_credit_threshold")]
    pub half_credit_threshold: f64,
    #[serde(default = "default_minimal_credit")]
    pub minimal_credit: f64,
}

impl Default for LearnerSettings {
    fn default() -> Self {
        Self {
            enabled: default_learner_enabled(),
            window_days: default_window_days(),
            interval_secs: default_interval_secs(),
            poll_secs: default_poll_secs(),
            min_trial_increment: default_min_trial_increment(),
            full_credit_threshold: default_full_credit_threshold(),
            half_credit_threshold: default_half_credit_threshold(),
            minimal_credit: default_minimal_credit(),
        }
    }
}

impl LearnerSettings {
    pub fn learner_config(&self) -> LearnerConfig {
        LearnerConfig {
            min_trial_increment: self.min_trial_increment,
            full_credit_threshold: self.full_credit_threshold,
            half_credit_threshold: self.half_credit_threshold,
            minimal_credit: self.minimal_credit,
        }
    }
}

fn default_learner_enabled() -> bool { true }
fn default_window_days() -> i64 { 30 }
fn default_interval_secs() -> u64 { 3600 }
fn default_poll_secs() -> u64 { 60 }
fn default_min_trial_increment() -> f64 { 0.05 }
fn default_full_credit_threshold() -> f64 { 0.66 }
fn default_half_credit_threshold() -> f64 { 0.33 }
fn default_minimal_credit() -> f64 { 0.1 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml, then config/local.toml)
    /// 3. Environment variables (prefixed with RENTRANK__)
    /// 4. DATABASE_URL
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. RENTRANK__SERVER__PORT -> server.port
            .add_source(env_source())
            .build()?;

        with_database_url(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;

        with_database_url(settings)?.try_deserialize()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("RENTRANK")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// DATABASE_URL wins over everything else when set
fn with_database_url(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}
