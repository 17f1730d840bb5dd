// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value store with switchable failures and call counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use tally_core::{AdapterType, HealthStatus, KeyTtl, KeyValueStore, PluginAdapter, TallyError};

/// Expiry-free map of bytes. Reads and writes can each be made to fail.
#[derive(Clone, Default)]
pub struct FlakyKvStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl FlakyKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `get` calls seen, failed ones included.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `set` calls seen, failed ones included.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store raw bytes directly, bypassing failure injection.
    pub async fn put_raw(&self, key: &str, value: &[u8]) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
    }

    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().await.get(key).cloned()
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), TallyError> {
        if flag.load(Ordering::SeqCst) {
            return Err(TallyError::StoreUnavailable {
                source: format!("injected {what} failure").into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for FlakyKvStore {
    fn name(&self) -> &str {
        "flaky-kv"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValue
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TallyError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_reads, "read")?;
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8], _ttl_secs: u64) -> Result<(), TallyError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_writes, "write")?;
        self.put_raw(key, value).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TallyError> {
        Self::check(&self.fail_writes, "write")?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TallyError> {
        Self::check(&self.fail_reads, "read")?;
        Ok(self.entries.lock().await.contains_key(key))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, TallyError> {
        Self::check(&self.fail_reads, "read")?;
        Ok(if self.entries.lock().await.contains_key(key) {
            KeyTtl::Persistent
        } else {
            KeyTtl::Missing
        })
    }

    async fn expire(&self, key: &str, _secs: u64) -> Result<bool, TallyError> {
        Self::check(&self.fail_writes, "write")?;
        Ok(self.entries.lock().await.contains_key(key))
    }

    async fn clear(&self) -> Result<(), TallyError> {
        Self::check(&self.fail_writes, "write")?;
        self.entries.lock().await.clear();
        Ok(())
    }
}
