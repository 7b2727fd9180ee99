use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env as std_env;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
const DEFAULT_RATE_LIMIT_NAMESPACE: &str = "checkout:rl";

/// Outbound payment gateway configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the gateway API
    pub base_url: String,
    /// Secret API key; an empty key disables the gateway entirely and
    /// checkout resolves to the manual confirmation path
    pub secret_key: String,
    /// Where the gateway redirects the customer after payment
    pub return_url: String,
    /// Where the gateway redirects on abandon
    pub cancel_url: String,
    /// Server-to-server notification target (webhook collaborator)
    pub notification_url: Option<String>,
    /// Outbound call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.payment.example".to_string(),
            secret_key: String::new(),
            return_url: "https://atelier.example/paiement/retour".to_string(),
            cancel_url: "https://atelier.example/paiement/annulation".to_string(),
            notification_url: None,
            timeout_secs: 20,
        }
    }
}

/// Pricing constants shared by the quote path and the price validator.
///
/// The tolerance is a deliberately small fixed constant absorbing rounding
/// differences between the composer and the server-side recomputation; it is
/// configuration, not something to tune away.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct PricingConfig {
    /// ISO currency code
    pub currency: String,
    /// Subunit factor used for gateway amounts (cents for EUR)
    pub minor_unit_factor: u32,
    /// Flat carrier-shipping fee (Colissimo); pickup is free
    pub shipping_fee: Decimal,
    /// Deposit fraction of the order total
    pub deposit_rate: Decimal,
    /// Per-note price of a custom build
    pub per_note_price: Decimal,
    /// Supported note-count range for custom builds
    pub min_note_count: u8,
    pub max_note_count: u8,
    /// Absolute tolerance when comparing declared vs recomputed prices
    pub price_tolerance: Decimal,
    /// Global transaction bounds, any payment mode
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Narrower bounds gating the installment-financing mode
    pub installment_min: Decimal,
    pub installment_max: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
            minor_unit_factor: 100,
            shipping_fee: Decimal::from(50),
            deposit_rate: Decimal::new(30, 2), // 0.30
            per_note_price: Decimal::from(115),
            min_note_count: 9,
            max_note_count: 17,
            price_tolerance: Decimal::ONE,
            min_amount: Decimal::ONE,
            max_amount: Decimal::from(20_000),
            installment_min: Decimal::from(100),
            installment_max: Decimal::from(3_000),
        }
    }
}

/// Per-endpoint rate-limit policies.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Payment-creation endpoint (fail-closed)
    pub payment_max_requests: u32,
    pub payment_window_secs: u64,
    /// Quote endpoint (informational, fail-open)
    pub quote_max_requests: u32,
    pub quote_window_secs: u64,
    /// Redis key namespace
    pub namespace: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            payment_max_requests: 5,
            payment_window_secs: 60,
            quote_max_requests: 30,
            quote_window_secs: 60,
            namespace: DEFAULT_RATE_LIMIT_NAMESPACE.to_string(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Application environment ("development", "production")
    pub environment: String,
    /// Logging level
    pub log_level: String,
    /// Log in JSON format (structured logging)
    pub log_json: bool,
    /// Redis connection URL (rate-limit persistence)
    pub redis_url: String,
    /// Optional JSON seed file for the in-memory catalog
    pub catalog_path: Option<String>,
    /// Origins allowed by CORS when running in production
    pub cors_allowed_origins: Vec<String>,
    #[validate]
    pub gateway: GatewayConfig,
    #[validate]
    pub pricing: PricingConfig,
    #[validate]
    pub rate_limit: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            catalog_path: None,
            cors_allowed_origins: Vec::new(),
            gateway: GatewayConfig::default(),
            pricing: PricingConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Load configuration from `config/default.toml` (optional) layered with
/// `APP__`-prefixed environment variables (e.g. `APP__GATEWAY__SECRET_KEY`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;
    Ok(cfg)
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("atelier_checkout_api={},tower_http=debug", level);
    let filter_directive = std_env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_coherent() {
        let cfg = AppConfig::default();
        assert!(!cfg.is_production());
        assert_eq!(cfg.pricing.deposit_rate, dec!(0.30));
        assert_eq!(cfg.pricing.shipping_fee, dec!(50));
        assert!(cfg.pricing.installment_min < cfg.pricing.installment_max);
        assert!(cfg.pricing.min_amount < cfg.pricing.max_amount);
        assert!(cfg.pricing.min_note_count < cfg.pricing.max_note_count);
    }

    #[test]
    fn production_flag() {
        let cfg = AppConfig {
            environment: "Production".to_string(),
            ..Default::default()
        };
        assert!(cfg.is_production());
    }
}
