// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of stores and engines from a loaded configuration.

use std::sync::Arc;

use tally_cache::{CacheLookup, ReadThroughCache};
use tally_config::TallyConfig;
use tally_core::{Clock, KeyValueStore, PluginAdapter, ReportWindow, SystemClock, TallyError};
use tally_cost::{PriceTable, QuotaEngine, ReportAggregator, UsageLedger, UsageReport};
use tally_storage::SqliteStorage;
use tracing::{info, warn};

/// Everything a command needs, built once per process.
pub struct Services {
    pub storage: Arc<SqliteStorage>,
    pub cache_store: Arc<dyn KeyValueStore>,
    pub ledger: UsageLedger,
    pub quotas: QuotaEngine,
    pub reports: ReportAggregator,
    pub cache: ReadThroughCache,
}

impl Services {
    /// Open the configured database and cache backend.
    pub async fn open(config: &TallyConfig) -> Result<Self, TallyError> {
        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache_store = tally_cache::build_store(&config.cache, clock.clone())?;
        Self::from_parts(config, storage, cache_store, clock)
    }

    /// Assemble services around already opened stores.
    pub fn from_parts(
        config: &TallyConfig,
        storage: Arc<SqliteStorage>,
        cache_store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TallyError> {
        let timeout = config.storage.store_timeout();
        let prices = Arc::new(PriceTable::from_config(&config.pricing)?);

        let ledger = UsageLedger::new(storage.clone(), prices)
            .with_clock(clock.clone())
            .with_timeout(timeout);
        let quotas = QuotaEngine::new(storage.clone(), storage.clone(), config.quota.clone())
            .with_clock(clock.clone())
            .with_timeout(timeout);
        let reports = ReportAggregator::new(storage.clone())
            .with_clock(clock.clone())
            .with_timeout(timeout);
        let cache = ReadThroughCache::from_config(cache_store.clone(), &config.cache)
            .with_clock(clock)
            .with_timeout(timeout);

        Ok(Self {
            storage,
            cache_store,
            ledger,
            quotas,
            reports,
            cache,
        })
    }

    /// Usage report for `window`, served from the cache while fresh.
    pub async fn cached_report(
        &self,
        window: ReportWindow,
        bypass_cache: bool,
    ) -> Result<CacheLookup<UsageReport>, TallyError> {
        let options = self.cache.default_options().bypass(bypass_cache);
        self.cache
            .get_or_compute(
                &report_cache_key(window),
                || self.reports.generate_report(window),
                &options,
            )
            .await
    }

    /// Release both stores. Failures are logged, not returned.
    pub async fn shutdown(&self) {
        if let Err(e) = self.cache_store.shutdown().await {
            warn!(error = %e, store = self.cache_store.name(), "cache store shutdown failed");
        }
        match self.storage.shutdown().await {
            Ok(()) => info!("storage closed"),
            Err(e) => warn!(error = %e, "storage shutdown failed"),
        }
    }
}

pub fn report_cache_key(window: ReportWindow) -> String {
    format!("report:{window}")
}
