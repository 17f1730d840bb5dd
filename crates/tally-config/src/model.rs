// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Tally.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::QuotaKind;

/// Top-level Tally configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values. The whole tree is
/// immutable once loaded and handed to components explicitly.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ledger and quota storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-model token prices.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Defaults applied to lazily created quota records.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Read-through cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Ledger and quota storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Upper bound for a single store call, in milliseconds.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl StorageConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tally").join("tally.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tally.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

/// Unit prices for one model, in currency per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPrice {
    /// Price per input token.
    pub input: Decimal,
    /// Price per output token.
    pub output: Decimal,
}

/// Price table configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Model whose prices apply to any model missing from `models`.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Exact-match price entries keyed by model identifier.
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelPrice>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            fallback_model: default_fallback_model(),
            models: default_models(),
        }
    }
}

fn default_fallback_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_models() -> BTreeMap<String, ModelPrice> {
    [
        ("gpt-3.5-turbo", "0.0000015", "0.000002"),
        ("gpt-4", "0.00003", "0.00006"),
        ("gpt-4-32k", "0.00006", "0.00012"),
        ("local-llm", "0", "0"),
    ]
    .into_iter()
    .map(|(model, input, output)| {
        (
            model.to_string(),
            ModelPrice {
                input: Decimal::from_str(input).unwrap_or_default(),
                output: Decimal::from_str(output).unwrap_or_default(),
            },
        )
    })
    .collect()
}

/// Defaults for quota records created on a user's first check.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Daily token ceiling.
    #[serde(default = "default_daily_token_limit")]
    pub daily_token_limit: u64,

    /// Monthly spend ceiling.
    #[serde(default = "default_monthly_cost_limit")]
    pub monthly_cost_limit: Decimal,

    /// Informational reset day of month (1-28).
    #[serde(default = "default_reset_day")]
    pub reset_day: u8,

    /// `soft` (advisory) or `hard` (enforced).
    #[serde(default)]
    pub kind: QuotaKind,

    /// Fraction of a limit at which a warning is logged.
    #[serde(default = "default_warn_ratio")]
    pub warn_ratio: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_token_limit: default_daily_token_limit(),
            monthly_cost_limit: default_monthly_cost_limit(),
            reset_day: default_reset_day(),
            kind: QuotaKind::default(),
            warn_ratio: default_warn_ratio(),
        }
    }
}

fn default_daily_token_limit() -> u64 {
    10_000
}

fn default_monthly_cost_limit() -> Decimal {
    Decimal::new(100, 1)
}

fn default_reset_day() -> u8 {
    1
}

fn default_warn_ratio() -> f64 {
    0.8
}

/// Key-value backend behind the read-through cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process store; entries do not outlive the process.
    #[default]
    Memory,
    /// Shared Redis instance (requires the `redis` feature).
    Redis,
}

/// Read-through cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Which key-value backend to use.
    #[serde(default)]
    pub backend: CacheBackend,

    /// Redis connection URL, required when `backend = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Namespace prepended to every cache key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Staleness bound used when a caller does not pass its own TTL.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Let concurrent misses on one key share a single computation.
    #[serde(default = "default_coalesce_misses")]
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            default_ttl_secs: default_ttl_secs(),
            coalesce_misses: default_coalesce_misses(),
        }
    }
}

fn default_key_prefix() -> String {
    "cache:".to_string()
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_coalesce_misses() -> bool {
    true
}
