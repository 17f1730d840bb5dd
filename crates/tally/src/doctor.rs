// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally doctor`: health checks over configuration, storage and cache.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tally_config::TallyConfig;
use tally_core::{HealthStatus, KeyValueStore, PluginAdapter, SystemClock, TallyError};
use tally_cost::PriceTable;
use tally_storage::SqliteStorage;

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run every check and print the results. Returns the number of failed checks.
pub async fn run_doctor(config: &TallyConfig, plain: bool) -> usize {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_prices(config),
        check_database(config).await,
        check_cache(config).await,
    ];

    println!();
    println!("  Tally Doctor");
    println!();

    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in &results {
        match result.status {
            CheckStatus::Pass => {}
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
        }
        println!("{}", render_line(result, use_color));
    }

    println!();
    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    fail_count
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    use colored::Colorize;

    let duration_ms = result.duration.as_millis();
    if use_color {
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal().to_string()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow().to_string()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red().to_string()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<20} {} ({duration_ms}ms)", result.name, result.message)
    }
}

/// Check the price table builds and report how many models it prices.
fn check_prices(config: &TallyConfig) -> CheckResult {
    let start = Instant::now();
    match PriceTable::from_config(&config.pricing) {
        Ok(table) => CheckResult::new(
            "Price table",
            CheckStatus::Pass,
            format!(
                "{} models, fallback {}",
                table.models().count(),
                table.fallback_model()
            ),
            start,
        ),
        Err(e) => CheckResult::new("Price table", CheckStatus::Fail, e.to_string(), start),
    }
}

/// Check the ledger database opens, migrates and answers queries.
async fn check_database(config: &TallyConfig) -> CheckResult {
    let start = Instant::now();
    let path = std::path::Path::new(&config.storage.database_path);
    if !path.exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!(
                "not found: {} (will be created on first run)",
                config.storage.database_path
            ),
            start,
        );
    }

    let storage = SqliteStorage::new(config.storage.clone());
    if let Err(e) = storage.initialize().await {
        return CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start);
    }
    let result = adapter_check("Database", &storage, start).await;
    let _ = storage.shutdown().await;
    result
}

/// Check the configured cache backend is reachable.
async fn check_cache(config: &TallyConfig) -> CheckResult {
    let start = Instant::now();
    let store: Arc<dyn KeyValueStore> =
        match tally_cache::build_store(&config.cache, Arc::new(SystemClock)) {
            Ok(store) => store,
            Err(e) => return CheckResult::new("Cache", CheckStatus::Fail, e.to_string(), start),
        };
    adapter_check("Cache", store.as_ref(), start).await
}

async fn adapter_check<A>(name: &str, adapter: &A, start: Instant) -> CheckResult
where
    A: PluginAdapter + ?Sized,
{
    let label = format!("{} ({})", name, adapter.name());
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => CheckResult::new(&label, CheckStatus::Pass, "healthy", start),
        Ok(HealthStatus::Degraded(reason)) => {
            CheckResult::new(&label, CheckStatus::Warn, format!("degraded: {reason}"), start)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new(&label, CheckStatus::Fail, format!("unhealthy: {reason}"), start)
        }
        Err(e) => CheckResult::new(&label, CheckStatus::Fail, failure_message(&e), start),
    }
}

fn failure_message(error: &TallyError) -> String {
    if error.is_store_failure() {
        format!("unreachable: {error}")
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_config::{CacheBackend, CacheConfig, StorageConfig};

    fn config_with_db(path: &std::path::Path) -> TallyConfig {
        TallyConfig {
            storage: StorageConfig {
                database_path: path.display().to_string(),
                ..StorageConfig::default()
            },
            ..TallyConfig::default()
        }
    }

    #[test]
    fn check_result_has_required_fields() {
        let result = CheckResult {
            name: "test".to_string(),
            status: CheckStatus::Pass,
            message: "ok".to_string(),
            duration: Duration::from_millis(5),
        };
        assert_eq!(result.name, "test");
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.duration.as_millis(), 5);
    }

    #[test]
    fn plain_lines_carry_status_tags() {
        let result = CheckResult {
            name: "Cache (memory)".to_string(),
            status: CheckStatus::Warn,
            message: "degraded: slow".to_string(),
            duration: Duration::from_millis(3),
        };
        let line = render_line(&result, false);
        assert!(line.starts_with("    [WARN] Cache (memory)"));
        assert!(line.ends_with("degraded: slow (3ms)"));
    }

    #[test]
    fn default_prices_pass() {
        let result = check_prices(&TallyConfig::default());
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(result.message.contains("fallback gpt-3.5-turbo"));
    }

    #[test]
    fn missing_fallback_price_fails() {
        let mut config = TallyConfig::default();
        config.pricing.fallback_model = "absent".into();
        assert_eq!(check_prices(&config).status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn missing_database_warns() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_db(&dir.path().join("missing.db"));
        let result = check_database(&config).await;
        assert_eq!(result.status, CheckStatus::Warn);
        assert!(result.message.contains("not found"));
    }

    #[tokio::test]
    async fn existing_database_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.db");
        let config = config_with_db(&path);

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await.unwrap();
        storage.shutdown().await.unwrap();

        let result = check_database(&config).await;
        assert_eq!(result.status, CheckStatus::Pass, "{}", result.message);
        assert_eq!(result.name, "Database (sqlite)");
    }

    #[tokio::test]
    async fn memory_cache_passes() {
        let result = check_cache(&TallyConfig::default()).await;
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.name, "Cache (memory)");
    }

    #[tokio::test]
    async fn redis_cache_without_url_fails() {
        let config = TallyConfig {
            cache: CacheConfig {
                backend: CacheBackend::Redis,
                ..CacheConfig::default()
            },
            ..TallyConfig::default()
        };
        let result = check_cache(&config).await;
        assert_eq!(result.status, CheckStatus::Fail);
    }
}
