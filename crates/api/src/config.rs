//! Application configuration loaded from environment variables.

use std::collections::HashSet;

use chrono_tz::Tz;
use common::ProductId;
use domain::BillingCalendar;
use saga::SagaConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `json` for structured logs, anything else for text
/// - `DATABASE_URL` — PostgreSQL ledger; unset runs an in-memory ledger
/// - `REFERENCE_TIMEZONE` — IANA zone for month boundaries (default: `America/New_York`)
/// - `DOMESTIC_COUNTRY` — ISO country shipped domestically (default: `US`)
/// - `BRIDGING_WINDOW_DAYS` — days around a month boundary that earn the bridging coupon (default: `3`)
/// - `CREDIT_SWAP_PRODUCTS` — comma-separated product ids swapped via account credit
/// - `SEED_DEMO` — seed a demo cycle and catalog at startup (default: `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub json_logs: bool,
    pub database_url: Option<String>,
    pub reference_timezone: Tz,
    pub domestic_country: String,
    pub bridging_window_days: u32,
    pub credit_swap_products: HashSet<ProductId>,
    pub seed_demo: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            json_logs: var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: var("DATABASE_URL").filter(|u| !u.trim().is_empty()),
            reference_timezone: var("REFERENCE_TIMEZONE")
                .and_then(|tz| tz.parse().ok())
                .unwrap_or(defaults.reference_timezone),
            domestic_country: var("DOMESTIC_COUNTRY")
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.domestic_country),
            bridging_window_days: var("BRIDGING_WINDOW_DAYS")
                .and_then(|d| d.parse().ok())
                .unwrap_or(defaults.bridging_window_days),
            credit_swap_products: var("CREDIT_SWAP_PRODUCTS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(ProductId::new)
                        .collect()
                })
                .unwrap_or_default(),
            seed_demo: var("SEED_DEMO")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.seed_demo),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Business rules for the sagas, with this configuration's overrides applied.
    pub fn saga_config(&self) -> SagaConfig {
        let mut config = SagaConfig {
            calendar: BillingCalendar::new(self.reference_timezone),
            credit_swap_products: self.credit_swap_products.clone(),
            ..SagaConfig::default()
        };
        config.plan_rules.domestic_country = self.domestic_country.clone();
        config.coupons.bridging_window_days = self.bridging_window_days;
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            json_logs: false,
            database_url: None,
            reference_timezone: chrono_tz::America::New_York,
            domestic_country: "US".to_string(),
            bridging_window_days: 3,
            credit_swap_products: HashSet::new(),
            seed_demo: true,
        }
    }
}
