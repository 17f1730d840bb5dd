// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-through caching for Tally.
//!
//! [`ReadThroughCache`] returns a stored value while it is younger than the
//! caller's TTL and otherwise computes, stores and returns a fresh one. Store
//! failures never fail a lookup. Values live in any [`KeyValueStore`]; an
//! in-process [`MemoryStore`] and, with the `redis` feature, a [`RedisStore`]
//! are provided.

use std::sync::Arc;

use tally_config::{CacheBackend, CacheConfig};
use tally_core::{Clock, KeyValueStore, TallyError};

pub mod entry;
pub mod memory;
pub mod read_through;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use entry::CacheEntry;
pub use memory::MemoryStore;
pub use read_through::{CacheLookup, CacheOptions, CacheSource, ReadThroughCache};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Build the key-value store selected by `[cache] backend`.
pub fn build_store(
    config: &CacheConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn KeyValueStore>, TallyError> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::with_clock(clock))),
        CacheBackend::Redis => open_redis(config),
    }
}

#[cfg(feature = "redis")]
fn open_redis(config: &CacheConfig) -> Result<Arc<dyn KeyValueStore>, TallyError> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| TallyError::Config("cache.redis_url is not set".into()))?;
    Ok(Arc::new(RedisStore::new(url)?))
}

#[cfg(not(feature = "redis"))]
fn open_redis(_config: &CacheConfig) -> Result<Arc<dyn KeyValueStore>, TallyError> {
    Err(TallyError::Config(
        "cache.backend = \"redis\" requires the `redis` feature".into(),
    ))
}
