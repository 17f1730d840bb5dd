// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process key-value store with per-key expiry.
//!
//! Expired keys are dropped lazily when touched. The store reads time from a
//! [`Clock`] so expiry can be driven in tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tally_core::{
    AdapterType, Clock, HealthStatus, KeyTtl, KeyValueStore, PluginAdapter, SystemClock,
    TallyError,
};

#[derive(Clone, Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// `HashMap` behind an async `RwLock`. Clones share the same map.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn expiry(&self, ttl_secs: u64) -> Option<DateTime<Utc>> {
        if ttl_secs == 0 {
            return None;
        }
        let ttl = chrono::Duration::from_std(Duration::from_secs(ttl_secs)).ok()?;
        self.clock.now().checked_add_signed(ttl)
    }

    /// Live entry for `key`, evicting it first if it has expired.
    async fn live(&self, key: &str) -> Option<StoredValue> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(value) if !value.is_expired(now) => return Some(value.clone()),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|v| v.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    /// Number of stored keys, expired ones included until they are touched.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValue
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TallyError> {
        Ok(self.live(key).await.map(|v| v.bytes))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), TallyError> {
        let stored = StoredValue {
            bytes: value.to_vec(),
            expires_at: self.expiry(ttl_secs),
        };
        self.entries.write().await.insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TallyError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TallyError> {
        Ok(self.live(key).await.is_some())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, TallyError> {
        let Some(value) = self.live(key).await else {
            return Ok(KeyTtl::Missing);
        };
        Ok(match value.expires_at {
            None => KeyTtl::Persistent,
            Some(exp) => KeyTtl::Expires((exp - self.clock.now()).to_std().unwrap_or(Duration::ZERO)),
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, TallyError> {
        if self.live(key).await.is_none() {
            return Ok(false);
        }
        let expires_at = self.expiry(ttl_secs);
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(value) => {
                value.expires_at = expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear(&self) -> Result<(), TallyError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
