// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value store with per-key expiry.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after the given duration.
    Expires(Duration),
}

/// Byte-oriented key-value store. Values are opaque to the store.
#[async_trait]
pub trait KeyValueStore: PluginAdapter {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TallyError>;

    /// Store `value`, expiring after `ttl_secs`. A TTL of zero stores without expiry.
    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), TallyError>;

    async fn delete(&self, key: &str) -> Result<(), TallyError>;

    async fn exists(&self, key: &str) -> Result<bool, TallyError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, TallyError>;

    /// Reset the expiry of an existing key. Returns `false` if the key is missing.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, TallyError>;

    /// Remove every key.
    async fn clear(&self) -> Result<(), TallyError>;
}
