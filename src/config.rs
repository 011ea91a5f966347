use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_STORE_BACKEND: &str = "in-memory";
const DEFAULT_DATABASE_URL: &str = "sqlite://replenish.db?mode=rwc";

pub const DEFAULT_EPSILON: f64 = 1e-6;
pub const DEFAULT_SPIKE_RATIO_THRESHOLD: f64 = 3.0;
pub const DEFAULT_SPIKE_RECENCY_DAYS: i64 = 7;
pub const DEFAULT_NO_CONSUMPTION_DAYS: f64 = 999.0;

/// Tuning for the consumption engine and draft generator.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Rates at or below this are treated as "no measurable consumption"
    #[serde(default = "default_epsilon")]
    #[validate(custom = "validate_positive_finite")]
    pub epsilon: f64,

    /// Observed/base ratio at which a declaration counts as a spike
    #[serde(default = "default_spike_ratio_threshold")]
    #[validate(custom = "validate_spike_ratio_threshold")]
    pub spike_ratio_threshold: f64,

    /// How long a detected spike overrides the base rate in drafts
    #[serde(default = "default_spike_recency_days")]
    #[validate(range(min = 0, max = 365))]
    pub spike_recency_days: i64,

    /// Days-to-zero reported for products without measurable consumption
    #[serde(default = "default_no_consumption_days")]
    #[validate(custom = "validate_positive_finite")]
    pub no_consumption_days: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            spike_ratio_threshold: default_spike_ratio_threshold(),
            spike_recency_days: default_spike_recency_days(),
            no_consumption_days: default_no_consumption_days(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Storage backend: "in-memory" or "database"
    #[serde(default = "default_store_backend")]
    #[validate(custom = "validate_store_backend")]
    pub store_backend: String,

    /// Database connection URL, used by the "database" backend
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Create missing tables on startup
    #[serde(default)]
    pub auto_create_schema: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Engine thresholds
    #[serde(default)]
    #[validate]
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            store_backend: default_store_backend(),
            database_url: default_database_url(),
            auto_create_schema: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn uses_database(&self) -> bool {
        self.store_backend.eq_ignore_ascii_case("database")
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if self.is_production() && self.uses_database() && self.database_url.starts_with("sqlite:") {
            let mut err = ValidationError::new("database_url_sqlite_in_production");
            err.message = Some(
                "SQLite is not supported in production. Set APP__DATABASE_URL to a Postgres URL."
                    .into(),
            );
            errors.add("database_url", err);
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
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_store_backend() -> String {
    DEFAULT_STORE_BACKEND.to_string()
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_spike_ratio_threshold() -> f64 {
    DEFAULT_SPIKE_RATIO_THRESHOLD
}

fn default_spike_recency_days() -> i64 {
    DEFAULT_SPIKE_RECENCY_DAYS
}

fn default_no_consumption_days() -> f64 {
    DEFAULT_NO_CONSUMPTION_DAYS
}

fn validate_store_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "database" => Ok(()),
        _ => {
            let mut err = ValidationError::new("store_backend");
            err.message = Some("Must be one of: in-memory, database".into());
            Err(err)
        }
    }
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

fn validate_positive_finite(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        let mut err = ValidationError::new("positive_finite");
        err.message = Some("must be a finite value greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_spike_ratio_threshold(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 1.0 {
        let mut err = ValidationError::new("spike_ratio_threshold");
        err.message = Some("spike_ratio_threshold must be a finite value greater than 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("replenish_engine={},replenish_cli={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("store_backend", DEFAULT_STORE_BACKEND)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
