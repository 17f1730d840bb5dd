// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.
//!
//! All problems are collected before returning so a single run reports them together.

use rust_decimal::Decimal;

use crate::diagnostic::ConfigError;
use crate::model::{CacheBackend, TallyConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "logging.level `{}` is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }
    if config.storage.store_timeout_ms == 0 {
        fail("storage.store_timeout_ms must be greater than zero".to_string());
    }

    if !config
        .pricing
        .models
        .contains_key(&config.pricing.fallback_model)
    {
        fail(format!(
            "pricing.fallback_model `{}` has no entry in [pricing.models]",
            config.pricing.fallback_model
        ));
    }
    for (model, price) in &config.pricing.models {
        if price.input < Decimal::ZERO || price.output < Decimal::ZERO {
            fail(format!(
                "pricing.models.{model} prices must be non-negative"
            ));
        }
    }

    if config.quota.monthly_cost_limit < Decimal::ZERO {
        fail(format!(
            "quota.monthly_cost_limit must be non-negative, got {}",
            config.quota.monthly_cost_limit
        ));
    }
    if !(1..=28).contains(&config.quota.reset_day) {
        fail(format!(
            "quota.reset_day must be between 1 and 28, got {}",
            config.quota.reset_day
        ));
    }
    if !(config.quota.warn_ratio > 0.0 && config.quota.warn_ratio <= 1.0) {
        fail(format!(
            "quota.warn_ratio must be in (0, 1], got {}",
            config.quota.warn_ratio
        ));
    }

    if config.cache.key_prefix.is_empty() {
        fail("cache.key_prefix must not be empty".to_string());
    }
    if config.cache.default_ttl_secs == 0 {
        fail("cache.default_ttl_secs must be greater than zero".to_string());
    }
    if config.cache.backend == CacheBackend::Redis
        && config
            .cache
            .redis_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
    {
        fail("cache.redis_url is required when cache.backend = \"redis\"".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
