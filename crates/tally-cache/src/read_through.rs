// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetch-or-compute over a key-value store.
//!
//! A lookup returns the stored value while it is younger than the caller's
//! TTL. Otherwise the caller's computation runs and its result is written back
//! with a store expiry equal to the TTL. A failed or undecodable read counts
//! as a miss, and a failed write is logged while the fresh value is still
//! returned. Only a failing computation fails the lookup.
//!
//! With coalescing on, misses on the same key queue behind a per-key lock and
//! re-read the store once they hold it, so a burst of misses computes once.
//! The lock lives in this process only.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tally_config::CacheConfig;
use tally_core::{Clock, KeyValueStore, SystemClock, TallyError, with_deadline};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::entry::CacheEntry;

const DEFAULT_KEY_PREFIX: &str = "cache:";
const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-call lookup options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Maximum age of a usable entry, and the store expiry on write.
    pub ttl_secs: u64,
    /// Prepended to the caller's key.
    pub key_prefix: String,
    /// Skip the lookup, always compute and overwrite.
    pub bypass_cache: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            bypass_cache: false,
        }
    }
}

impl CacheOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            ttl_secs: config.default_ttl_secs,
            key_prefix: config.key_prefix.clone(),
            bypass_cache: false,
        }
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn bypass(mut self, bypass_cache: bool) -> Self {
        self.bypass_cache = bypass_cache;
        self
    }

    fn effective_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

/// Where a looked-up value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Cache,
    Fresh,
}

/// Result of [`ReadThroughCache::get_or_compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<T> {
    pub value: T,
    pub source: CacheSource,
    /// Age of the stored entry; `None` for fresh values.
    pub age: Option<Duration>,
    /// The effective (prefixed) key.
    pub key: String,
}

/// Read-through cache over a [`KeyValueStore`].
pub struct ReadThroughCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    coalesce_misses: bool,
    defaults: CacheOptions,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_STORE_TIMEOUT,
            coalesce_misses: true,
            defaults: CacheOptions::default(),
            in_flight: DashMap::new(),
        }
    }

    /// Build with `[cache]` settings for defaults and coalescing.
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        Self {
            coalesce_misses: config.coalesce_misses,
            defaults: CacheOptions::from_config(config),
            ..Self::new(store)
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }

    /// Options built from the configured prefix and TTL.
    pub fn default_options(&self) -> CacheOptions {
        self.defaults.clone()
    }

    /// Return a fresh cached value for `key`, or compute, store and return a new one.
    ///
    /// Errors only with [`TallyError::ComputeFailed`] when `compute` fails.
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        key: &str,
        compute: F,
        options: &CacheOptions,
    ) -> Result<CacheLookup<T>, TallyError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let key = options.effective_key(key);

        if options.bypass_cache {
            debug!(key = %key, "cache bypassed");
            return self.compute_and_store(key, compute, options.ttl_secs).await;
        }

        if let Some(hit) = self.read_fresh(&key, options.ttl_secs).await {
            return Ok(hit);
        }

        if !self.coalesce_misses {
            return self.compute_and_store(key, compute, options.ttl_secs).await;
        }

        let lock = self.in_flight.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            match self.read_fresh(&key, options.ttl_secs).await {
                Some(hit) => Ok(hit),
                None => self.compute_and_store(key.clone(), compute, options.ttl_secs).await,
            }
        };
        drop(lock);
        self.in_flight
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Delete the entry for `key` under `prefix` (the configured prefix when `None`).
    pub async fn invalidate(&self, key: &str, prefix: Option<&str>) -> Result<(), TallyError> {
        let prefix = prefix.unwrap_or(&self.defaults.key_prefix);
        let key = format!("{prefix}{key}");
        with_deadline(self.timeout, self.store.delete(&key)).await?;
        debug!(key = %key, "cache entry invalidated");
        Ok(())
    }

    async fn read_fresh<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl_secs: u64,
    ) -> Option<CacheLookup<T>> {
        let bytes = match with_deadline(self.timeout, self.store.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let entry = match CacheEntry::<T>::decode(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "undecodable cache entry, treating as miss");
                return None;
            }
        };

        let now = self.clock.now();
        if !entry.is_fresh(now, ttl_secs) {
            debug!(key, age_secs = entry.age(now).as_secs(), "cache entry stale");
            return None;
        }

        let age = entry.age(now);
        debug!(key, age_secs = age.as_secs(), "cache hit");
        Some(CacheLookup {
            value: entry.value,
            source: CacheSource::Cache,
            age: Some(age),
            key: key.to_string(),
        })
    }

    async fn compute_and_store<T, F, Fut, E>(
        &self,
        key: String,
        compute: F,
        ttl_secs: u64,
    ) -> Result<CacheLookup<T>, TallyError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let value = compute()
            .await
            .map_err(|e| TallyError::ComputeFailed { source: e.into() })?;

        let entry = CacheEntry::new(value, self.clock.now());
        let written = match entry.encode() {
            Ok(bytes) => with_deadline(self.timeout, self.store.set(&key, &bytes, ttl_secs)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(key = %key, error = %e, "cache write failed, returning fresh value");
        }

        Ok(CacheLookup {
            value: entry.value,
            source: CacheSource::Fresh,
            age: None,
            key,
        })
    }
}
