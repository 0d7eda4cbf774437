use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::pricing::PricingEngine;

pub mod cors;

pub use cors::create_cors_layer;

pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// `None` disables cache invalidation.
    pub redis_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origins: String,
    pub seat_lock_timeout: Duration,
    pub booking_max_attempts: u32,
    pub booking_retry_base_delay: Duration,
    pub notification_queue_capacity: usize,
    pub notification_timeout: Duration,
    /// Upper bound on one post-commit cache invalidation.
    pub cache_timeout: Duration,
    pub pricing: PricingEngine,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            redis_url: None,
            server_host: "0.0.0.0".to_string(),
            server_port: 3001,
            cors_allowed_origins: DEFAULT_ALLOWED_ORIGINS.to_string(),
            seat_lock_timeout: Duration::from_millis(5000),
            booking_max_attempts: 3,
            booking_retry_base_delay: Duration::from_millis(50),
            notification_queue_capacity: 1024,
            notification_timeout: Duration::from_millis(10_000),
            cache_timeout: Duration::from_millis(1000),
            pricing: PricingEngine::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            database_url: text("DATABASE_URL"),
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            redis_url: text("REDIS_URL"),
            server_host: text("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or(defaults.cors_allowed_origins),
            seat_lock_timeout: millis_or(&lookup, "SEAT_LOCK_TIMEOUT_MS", defaults.seat_lock_timeout),
            booking_max_attempts: parse_or(&lookup, "BOOKING_MAX_ATTEMPTS", defaults.booking_max_attempts)
                .max(1),
            booking_retry_base_delay: millis_or(
                &lookup,
                "BOOKING_RETRY_BASE_DELAY_MS",
                defaults.booking_retry_base_delay,
            ),
            notification_queue_capacity: parse_or(
                &lookup,
                "NOTIFICATION_QUEUE_CAPACITY",
                defaults.notification_queue_capacity,
            )
            .max(1),
            notification_timeout: millis_or(
                &lookup,
                "NOTIFICATION_TIMEOUT_MS",
                defaults.notification_timeout,
            ),
            cache_timeout: millis_or(&lookup, "CACHE_TIMEOUT_MS", defaults.cache_timeout),
            pricing: match text("PRICING_TIERS") {
                None => defaults.pricing,
                Some(raw) => raw.parse().unwrap_or_else(|e| {
                    warn!("PRICING_TIERS='{}' is not valid ({}), using the default table", raw, e);
                    defaults.pricing
                }),
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{}='{}' is not valid, using default {}", key, raw, default);
            default
        }),
    }
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    let default_ms = default.as_millis() as u64;
    Duration::from_millis(parse_or(lookup, key, default_ms))
}
