// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Tally.

use thiserror::Error;

/// The primary error type shared by the store traits and the metering components.
///
/// Which variants a caller can actually observe depends on the operation:
/// quota checks and cache lookups degrade instead of failing, while reports
/// and caller-supplied computations surface their failures.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration errors (invalid TOML, bad price table, out-of-range limits).
    #[error("configuration error: {0}")]
    Config(String),

    /// A ledger, quota, or key-value store is unreachable, failed, or timed out.
    #[error("store unavailable: {source}")]
    StoreUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The computation handed to the read-through cache failed.
    #[error("value computation failed: {source}")]
    ComputeFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed input, e.g. an unknown report window in strict parsing.
    #[error("validation error: {0}")]
    Validation(String),

    /// A cached or stored payload could not be encoded or decoded.
    #[error("serialization error: {source}")]
    Serialization {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A hard quota denied the request.
    #[error("quota exceeded for user {user_id}: {message}")]
    QuotaExceeded { user_id: String, message: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Wrap any error as a store failure.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TallyError::StoreUnavailable {
            source: Box::new(err),
        }
    }

    /// True for failures of an external store, including timeouts.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, TallyError::StoreUnavailable { .. })
    }
}
