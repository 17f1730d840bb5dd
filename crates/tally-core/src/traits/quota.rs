// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user quota records.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::QuotaRecord;

/// Store holding exactly one [`QuotaRecord`] per user. May share a backend with the ledger.
#[async_trait]
pub trait QuotaStore: PluginAdapter {
    /// Fetch the record for a user, if one exists.
    async fn get(&self, user_id: &str) -> Result<Option<QuotaRecord>, TallyError>;

    /// Insert `defaults` unless a record already exists, returning whichever is stored.
    ///
    /// Must be idempotent: concurrent first checks for the same user end with one record.
    async fn create_default(&self, defaults: &QuotaRecord) -> Result<QuotaRecord, TallyError>;
}
