use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_VAT_RATE: f64 = 0.05;
const DEFAULT_CASH_SURCHARGE: f64 = 5.0;
const DEFAULT_INSTALLMENT_MONTHS: u32 = 4;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CURRENCY: &str = "AED";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
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

    /// VAT rate applied on the payable amount (fraction, e.g. 0.05 for 5%)
    #[serde(default = "default_vat_rate")]
    #[validate(custom = "validate_rate_fraction")]
    pub vat_rate: f64,

    /// Flat surcharge added when paying cash on delivery
    #[serde(default = "default_cash_surcharge")]
    pub cash_surcharge: f64,

    /// Number of monthly installments shown for installment payment plans
    #[serde(default = "default_installment_months")]
    #[validate(range(min = 1, max = 36))]
    pub installment_months: u32,

    /// ISO currency code used for payment sessions
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Checkout session TTL in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Timeout for collaborator HTTP calls in seconds
    #[serde(default = "default_http_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub http_timeout_secs: u64,

    /// Base URL of the offer rules collaborator
    pub offer_rules_base_url: String,

    /// Base URL of the appointment service collaborator
    pub appointments_base_url: String,

    /// Base URL of the payment gateway collaborator
    pub payment_gateway_base_url: String,

    /// Base URL of the authentication collaborator
    pub auth_base_url: String,

    /// URL the payment gateway redirects to after a completed payment
    pub payment_return_url: String,

    /// URL the payment gateway redirects to after a cancelled payment
    pub payment_cancel_url: String,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_vat_rate() -> f64 {
    DEFAULT_VAT_RATE
}

fn default_cash_surcharge() -> f64 {
    DEFAULT_CASH_SURCHARGE
}

fn default_installment_months() -> u32 {
    DEFAULT_INSTALLMENT_MONTHS
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn validate_rate_fraction(rate: f64) -> Result<(), ValidationError> {
    if !(0.0..1.0).contains(&rate) {
        return Err(ValidationError::new("rate_fraction_out_of_range"));
    }
    Ok(())
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// VAT rate as an exact decimal fraction.
    pub fn vat_rate_decimal(&self) -> Decimal {
        Decimal::from_f64_retain(self.vat_rate).unwrap_or(Decimal::ZERO)
    }

    /// Cash-on-delivery surcharge as an exact decimal amount.
    pub fn cash_surcharge_decimal(&self) -> Decimal {
        Decimal::from_f64_retain(self.cash_surcharge).unwrap_or(Decimal::ZERO)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Load configuration from defaults, optional `config/` files and `APP__*`
/// environment variables (highest precedence).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
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

    let builder = Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("vat_rate", DEFAULT_VAT_RATE)?
        .set_default("cash_surcharge", DEFAULT_CASH_SURCHARGE)?
        .set_default("installment_months", i64::from(DEFAULT_INSTALLMENT_MONTHS))?
        .set_default("currency", DEFAULT_CURRENCY)?
        .set_default("session_ttl_secs", DEFAULT_SESSION_TTL_SECS as i64)?
        .set_default("http_timeout_secs", DEFAULT_HTTP_TIMEOUT_SECS as i64)?
        .set_default("offer_rules_base_url", "http://localhost:9101")?
        .set_default("appointments_base_url", "http://localhost:9102")?
        .set_default("payment_gateway_base_url", "http://localhost:9103")?
        .set_default("auth_base_url", "http://localhost:9104")?
        .set_default(
            "payment_return_url",
            "https://app.homebook.example/checkout/return",
        )?
        .set_default(
            "payment_cancel_url",
            "https://app.homebook.example/checkout/cancel",
        )?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Initialize the tracing subscriber with an env-filter.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("homebook_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter =
        EnvFilter::try_new(filter_directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}
