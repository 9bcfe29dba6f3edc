//! Runtime settings read from environment variables.
//!
//! Every value has a default so the service starts with an empty environment (apart from
//! `DATABASE_URL`, which the binary requires).
//!
//! Environment variables:
//! - `PORT` (8080), `DATABASE_URL`, `ETHERSCAN_API_KEY`
//! - `HOT_CACHE_ENABLED` (true), `HOT_CACHE_TOP_WALLETS` (50),
//!   `HOT_CACHE_REFRESH_INTERVAL_SECS` (60), `HOT_CACHE_PAGE_LIMIT` (25),
//!   `HOT_CACHE_MAX_ITEMS_PER_WALLET` (200), `HOT_CACHE_FRESH_TTL_SECS` (90),
//!   `HOT_CACHE_STALE_TTL_SECS` (1800), `HOT_CACHE_MAX_KEYS` (1000)
//! - `REQUEST_CACHE_FRESH_TTL_SECS` (30), `REQUEST_CACHE_STALE_TTL_SECS` (600),
//!   `REQUEST_CACHE_MAX_KEYS` (5000)
//! - `RATE_LIMIT_COOLDOWN_SECS` (120), `EXPLORER_TIMEOUT_SECS` (10),
//!   `REQUESTS_PER_MINUTE` (30)

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Hot-cache refresh engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotCacheSettings {
    pub enabled: bool,
    pub top_wallets: usize,
    pub refresh_interval_secs: u64,
    pub page_limit: usize,
    pub max_items_per_wallet: usize,
    pub fresh_ttl_secs: u64,
    pub stale_ttl_secs: u64,
    pub max_keys: usize,
    pub rate_limit_cooldown_secs: u64,
}

impl Default for HotCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            top_wallets: 50,
            refresh_interval_secs: 60,
            page_limit: 25,
            max_items_per_wallet: 200,
            fresh_ttl_secs: 90,
            stale_ttl_secs: 1800,
            max_keys: 1000,
            rate_limit_cooldown_secs: 120,
        }
    }
}

/// Request-level cache and limiter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSettings {
    pub cache_fresh_ttl_secs: u64,
    pub cache_stale_ttl_secs: u64,
    pub cache_max_keys: usize,
    pub requests_per_minute: u32,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            cache_fresh_ttl_secs: 30,
            cache_stale_ttl_secs: 600,
            cache_max_keys: 5000,
            requests_per_minute: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_url: Option<String>,
    pub etherscan_api_key: Option<String>,
    pub explorer_timeout: Duration,
    pub hot_cache: HotCacheSettings,
    pub requests: RequestSettings,
}

impl Settings {
    pub fn from_env() -> Self {
        let hot = HotCacheSettings::default();
        let req = RequestSettings::default();

        Self {
            port: env_or("PORT", 8080),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            etherscan_api_key: env::var("ETHERSCAN_API_KEY").ok().filter(|v| !v.is_empty()),
            explorer_timeout: Duration::from_secs(env_or("EXPLORER_TIMEOUT_SECS", 10)),
            hot_cache: HotCacheSettings {
                enabled: env_or("HOT_CACHE_ENABLED", hot.enabled),
                top_wallets: env_or("HOT_CACHE_TOP_WALLETS", hot.top_wallets),
                refresh_interval_secs: env_or(
                    "HOT_CACHE_REFRESH_INTERVAL_SECS",
                    hot.refresh_interval_secs,
                ),
                page_limit: env_or("HOT_CACHE_PAGE_LIMIT", hot.page_limit),
                max_items_per_wallet: env_or(
                    "HOT_CACHE_MAX_ITEMS_PER_WALLET",
                    hot.max_items_per_wallet,
                ),
                fresh_ttl_secs: env_or("HOT_CACHE_FRESH_TTL_SECS", hot.fresh_ttl_secs),
                stale_ttl_secs: env_or("HOT_CACHE_STALE_TTL_SECS", hot.stale_ttl_secs),
                max_keys: env_or("HOT_CACHE_MAX_KEYS", hot.max_keys),
                rate_limit_cooldown_secs: env_or(
                    "RATE_LIMIT_COOLDOWN_SECS",
                    hot.rate_limit_cooldown_secs,
                ),
            },
            requests: RequestSettings {
                cache_fresh_ttl_secs: env_or(
                    "REQUEST_CACHE_FRESH_TTL_SECS",
                    req.cache_fresh_ttl_secs,
                ),
                cache_stale_ttl_secs: env_or(
                    "REQUEST_CACHE_STALE_TTL_SECS",
                    req.cache_stale_ttl_secs,
                ),
                cache_max_keys: env_or("REQUEST_CACHE_MAX_KEYS", req.cache_max_keys),
                requests_per_minute: env_or("REQUESTS_PER_MINUTE", req.requests_per_minute),
            },
        }
    }
}

/// Parses `name` or falls back to `default` when unset or malformed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
