use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub reservation: ReservationRules,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationRules {
    /// How long a PENDING reservation may wait for payment before it is cancelled.
    pub grace_period_seconds: u64,
    /// Age after which a PENDING reservation is reported as orphaned.
    #[serde(default = "default_stale_pending")]
    pub stale_pending_seconds: u64,
}

impl ReservationRules {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }

    pub fn stale_pending(&self) -> Duration {
        Duration::from_secs(self.stale_pending_seconds)
    }
}

fn default_stale_pending() -> u64 { 3600 }

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub request_timeout_ms: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: usize,
    #[serde(default = "default_breaker_reset")]
    pub breaker_reset_seconds: u64,
    pub stripe: StripeConfig,
    pub paypal: PaypalConfig,
}

impl PaymentsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_currency() -> String { "USD".to_string() }
fn default_breaker_threshold() -> usize { 5 }
fn default_breaker_reset() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct StripeConfig {
    pub api_base: String,
    pub secret_key: String,
    #[serde(default)]
    pub publishable_key: String,
    pub webhook_secret: String,
    #[serde(default = "default_tolerance")]
    pub signature_tolerance_seconds: u64,
}

fn default_tolerance() -> u64 { 300 }

impl StripeConfig {
    pub fn payments_enabled(&self) -> bool {
        !self.secret_key.trim().is_empty()
    }

    pub fn webhooks_enabled(&self) -> bool {
        !self.webhook_secret.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaypalConfig {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    pub return_url: String,
    pub cancel_url: String,
    pub trusted_cert_prefix: String,
    #[serde(default = "default_cert_cache")]
    pub cert_cache_seconds: u64,
}

fn default_cert_cache() -> u64 { 3600 }

impl PaypalConfig {
    pub fn payments_enabled(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    pub fn webhooks_enabled(&self) -> bool {
        !self.webhook_id.trim().is_empty() && !self.trusted_cert_prefix.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout() -> u64 { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Requests allowed per client IP within one window.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: i64,
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_seconds: i64,
}

fn default_rate_limit_requests() -> i64 { 100 }
fn default_rate_limit_window() -> i64 { 60 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `HAVEN__PAYMENTS__STRIPE__SECRET_KEY=sk_live_...`
            .add_source(config::Environment::with_prefix("HAVEN").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Load from an in-memory TOML document. Used by tests and tooling.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
