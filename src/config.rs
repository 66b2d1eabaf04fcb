use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::ml::{ForecastConfig, RandomForestConfig};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8001;
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
const CONFIG_DIR: &str = "config";
const DEFAULT_CACHE_BACKEND: &str = "redis";
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_CACHE_KEY_PREFIX: &str = "predictions";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Prediction cache configuration
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Backend to use: "redis" or "in-memory"
    #[serde(default = "default_cache_backend")]
    #[validate(custom = "validate_cache_backend")]
    pub backend: String,

    /// Lifetime of a cached prediction batch in seconds
    #[serde(default = "default_cache_ttl_secs")]
    #[validate(range(min = 1, max = 604800))]
    pub ttl_secs: u64,

    /// Prefix of the daily batch key (`<prefix>:YYYYMMDD`)
    #[serde(default = "default_cache_key_prefix")]
    #[validate(length(min = 1))]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            key_prefix: default_cache_key_prefix(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Forecaster tuning knobs
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ForecastSettings {
    /// Number of trees in the random forest
    #[serde(default = "default_n_estimators")]
    #[validate(range(min = 1, max = 1000))]
    pub n_estimators: usize,

    /// Maximum tree depth; unlimited when absent
    #[serde(default)]
    pub max_depth: Option<usize>,

    #[serde(default = "default_min_samples_split")]
    #[validate(range(min = 2))]
    pub min_samples_split: usize,

    /// Seed of the forest's bootstrap and feature sampling
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Histories shorter than this go straight to the fallback
    #[serde(default = "default_min_history_records")]
    #[validate(range(min = 7))]
    pub min_history_records: usize,

    /// Valid feature rows required before the forest is fitted
    #[serde(default = "default_min_feature_rows")]
    #[validate(range(min = 14))]
    pub min_feature_rows: usize,

    /// Fixes the fallback generator's seed. Unset means a fresh draw per batch.
    #[serde(default)]
    pub fallback_seed: Option<u64>,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            random_seed: default_random_seed(),
            min_history_records: default_min_history_records(),
            min_feature_rows: default_min_feature_rows(),
            fallback_seed: None,
        }
    }
}

impl ForecastSettings {
    /// Forecaster configuration derived from these settings
    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            min_history_records: self.min_history_records,
            min_feature_rows: self.min_feature_rows,
            forest: RandomForestConfig {
                n_estimators: self.n_estimators,
                max_depth: self.max_depth,
                min_samples_split: self.min_samples_split,
                seed: self.random_seed,
                ..RandomForestConfig::default()
            },
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prediction cache configuration
    #[serde(default)]
    #[validate]
    pub cache: CacheConfig,

    /// Forecaster configuration
    #[serde(default)]
    #[validate]
    pub forecast: ForecastSettings,

    /// Comma-separated list of allowed CORS origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow any origin outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// Per-request time budget in seconds
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            redis_url: default_redis_url(),
            cache: CacheConfig::default(),
            forecast: ForecastSettings::default(),
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Configured CORS origins, blanks removed
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        !self.cors_origins().is_empty()
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if self.cache.backend == "redis" && !self.redis_url.starts_with("redis") {
            let mut err = ValidationError::new("redis_url");
            err.message = Some("Must be a redis:// or rediss:// URL".into());
            errors.add("redis_url", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

fn default_cache_backend() -> String {
    DEFAULT_CACHE_BACKEND.to_string()
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_cache_key_prefix() -> String {
    DEFAULT_CACHE_KEY_PREFIX.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_n_estimators() -> usize {
    100
}
fn default_min_samples_split() -> usize {
    2
}
fn default_random_seed() -> u64 {
    42
}
fn default_min_history_records() -> usize {
    7
}
fn default_min_feature_rows() -> usize {
    14
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_cache_backend(backend: &str) -> Result<(), ValidationError> {
    match backend {
        "redis" | "in-memory" => Ok(()),
        _ => {
            let mut err = ValidationError::new("cache_backend");
            err.message = Some("Must be one of: redis, in-memory".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("shopintelli_ai={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Loads configuration from an explicit directory and profile name.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env)?
        .add_source(File::with_name(&format!("{}/default", config_dir.display())).required(false))
        .add_source(
            File::with_name(&format!("{}/{}", config_dir.display(), run_env)).required(false),
        )
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod cors_validation_tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            environment: "production".into(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_allows_override_flag() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example.com, ,https://admin.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(
            cfg.cors_origins(),
            vec!["https://shop.example.com", "https://admin.example.com"]
        );
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let cfg = AppConfig::default();
        assert!(cfg.is_development());
        assert!(cfg.validate_additional_constraints().is_ok());
    }
}
