// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stored cache envelope.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tally_core::TallyError;

/// A value plus the instant it was stored. Encoded as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    /// Time since the entry was stored. Clock skew into the future reads as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Fresh while strictly younger than `ttl_secs`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_secs: u64) -> bool {
        self.age(now) < Duration::from_secs(ttl_secs)
    }
}

impl<T: Serialize> CacheEntry<T> {
    pub fn encode(&self) -> Result<Vec<u8>, TallyError> {
        serde_json::to_vec(self).map_err(|e| TallyError::Serialization {
            source: Box::new(e),
        })
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    pub fn decode(bytes: &[u8]) -> Result<Self, TallyError> {
        serde_json::from_slice(bytes).map_err(|e| TallyError::Serialization {
            source: Box::new(e),
        })
    }
}
