//! Runtime configuration.
//!
//! Sources, later overriding earlier:
//! 1. built-in defaults
//! 2. `APP__*` environment variables (`__` separates nesting, e.g. `APP__GATEWAY__BASE_URL`)
//! 3. flat legacy variables such as `DATABASE_URL`
//!
//! `.env` is loaded by `main` before [`AppConfig::load`] runs.

use std::time::Duration;

use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub run_migrations: bool,
    /// IANA zone used for weekend counting and the past-date check.
    pub timezone: String,
    pub gateway: GatewayConfig,
    pub mail: MailConfig,
    pub cache: CacheConfig,
    pub reconcile: ReconcileConfig,
    pub pricing: PriceRates,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_url: String::new(),
            run_migrations: false,
            timezone: "Asia/Jakarta".to_string(),
            gateway: GatewayConfig::default(),
            mail: MailConfig::default(),
            cache: CacheConfig::default(),
            reconcile: ReconcileConfig::default(),
            pricing: PriceRates::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// Tax id attached to every invoice line.
    pub tax_id: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
            tax_id: "pph-21-25".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Relay endpoint; notifications are only logged when unset.
    pub relay_url: Option<String>,
    pub operations_recipient: String,
    pub frontend_url: String,
    pub admin_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            operations_recipient: "operations@localhost".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            admin_url: "http://localhost:5174".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub status_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            status_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Pause before the first gateway read.
    pub settle_delay_secs: u64,
    /// Extra reads while the gateway or local state still lags.
    pub max_retries: usize,
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 10,
            max_retries: 3,
            retry_min_delay_ms: 2_000,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl ReconcileConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn retry_min_delay(&self) -> Duration {
        Duration::from_millis(self.retry_min_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

/// Rate card for the pricing calculator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriceRates {
    pub in_town_daily_driver_fee: Decimal,
    pub out_town_daily_driver_fee: Decimal,
    pub car_out_of_town_fee: Decimal,
    pub motorcycle_out_of_town_fee: Decimal,
    pub car_weekend_rate: Decimal,
    pub motorcycle_weekend_rate: Decimal,
    /// PPh 21 2.5% grossed up (2.5 / 97.5), applied after discount.
    pub tax_rate: Decimal,
}

impl Default for PriceRates {
    fn default() -> Self {
        Self {
            in_town_daily_driver_fee: Decimal::from(150_000),
            out_town_daily_driver_fee: Decimal::from(250_000),
            car_out_of_town_fee: Decimal::from(200_000),
            motorcycle_out_of_town_fee: Decimal::from(50_000),
            car_weekend_rate: Decimal::from(50_000),
            motorcycle_weekend_rate: Decimal::from(25_000),
            tax_rate: Decimal::new(256, 4),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        use config::{Config, Environment};

        let cfg = Config::builder()
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        cfg.try_deserialize()
    }

    pub fn tz(&self) -> AppResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| AppError::Internal(format!("invalid timezone {}: {}", self.timezone, e)))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
