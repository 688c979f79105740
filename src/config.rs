use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_API_BASE: &str = "https://api.smartpay.co/v1";
const DEFAULT_CHECKOUT_URL: &str = "https://checkout.smartpay.co";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

// Key formats enforced by the processor: pk_(test|live)_... / sk_(test|live)_...
static PUBLIC_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pk_(test|live)_[0-9a-zA-Z]+$").expect("valid public key regex"));
static SECRET_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sk_(test|live)_[0-9a-zA-Z]+$").expect("valid secret key regex"));

fn validate_public_key(key: &str) -> Result<(), ValidationError> {
    if PUBLIC_KEY_RE.is_match(key) {
        Ok(())
    } else {
        let mut err = ValidationError::new("public_key_format");
        err.message = Some("public key must match pk_(test|live)_[0-9a-zA-Z]+".into());
        Err(err)
    }
}

fn validate_secret_key(key: &str) -> Result<(), ValidationError> {
    if SECRET_KEY_RE.is_match(key) {
        Ok(())
    } else {
        let mut err = ValidationError::new("secret_key_format");
        err.message = Some("secret key must match sk_(test|live)_[0-9a-zA-Z]+".into());
        Err(err)
    }
}

/// Settings for talking to the Smartpay processor.
///
/// Loaded once at startup and passed by reference; the engine never mutates
/// configuration at runtime.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SmartpayConfig {
    /// Processor API base URL prefix
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Hosted checkout base URL the customer is redirected to
    #[serde(default = "default_checkout_url")]
    pub checkout_url: String,

    /// Publishable API key
    #[validate(custom = "validate_public_key")]
    pub public_key: String,

    /// Secret API key, sent as the authorization credential on every call
    #[validate(custom = "validate_secret_key")]
    pub secret_key: String,

    /// Webhook subscription id; webhook processing is disabled when unset
    #[serde(default)]
    pub webhook_id: Option<String>,

    /// Webhook signing secret (base62); webhook processing is disabled when unset
    #[serde(default)]
    pub webhook_signing_secret: Option<String>,

    /// URL the hosted checkout redirects to after a successful payment
    pub success_url: String,

    /// URL the hosted checkout redirects to when the customer aborts
    pub cancel_url: String,

    /// Bounded timeout for all processor calls
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl SmartpayConfig {
    /// Construct settings with defaults for everything but the credentials
    /// and redirect URLs. Used by tests and embedding callers.
    pub fn new(
        api_base: impl Into<String>,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            checkout_url: default_checkout_url(),
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            webhook_id: None,
            webhook_signing_secret: None,
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }

    /// Whether webhook confirmation is configured at all.
    pub fn webhook_configured(&self) -> bool {
        self.webhook_id.is_some() && self.webhook_signing_secret.is_some()
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

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

    /// Smartpay processor settings
    #[validate]
    pub smartpay: SmartpayConfig,
}

impl AppConfig {
    /// Programmatic constructor used by tests and embedding callers.
    pub fn new(
        database_url: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        environment: impl Into<String>,
        smartpay: SmartpayConfig,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            host: host.into(),
            port,
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            smartpay,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
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

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_checkout_url() -> String {
    DEFAULT_CHECKOUT_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
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

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("smartpay_gateway={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*, `__` as separator)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // NOTE: the Smartpay keys have no defaults - they MUST be provided via
    // environment variables or a config file.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://smartpay_gateway.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // Check the credentials before deserialization for a clear error message.
    for key in ["smartpay.public_key", "smartpay.secret_key"] {
        if config.get_string(key).is_err() {
            error!(
                "{key} is not configured. Set APP__{} with the credential issued by the processor dashboard.",
                key.replace('.', "__").to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{key} is required but not configured"
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
