// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only usage ledger with aggregate queries.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DateRange, GroupField, UsageEvent, UsageGroup};

/// Append-only store of [`UsageEvent`]s.
///
/// Aggregates are point-in-time snapshots with no synchronization against
/// concurrent appends. Any backend (relational, columnar, log-structured)
/// that can answer these four calls is acceptable.
#[async_trait]
pub trait LedgerStore: PluginAdapter {
    /// Append one event.
    async fn append(&self, event: &UsageEvent) -> Result<(), TallyError>;

    /// Total tokens for a user with `created_at` inside `range`.
    async fn sum_tokens(&self, user_id: &str, range: &DateRange) -> Result<u64, TallyError>;

    /// Total cost for a user with `created_at` inside `range`.
    async fn sum_cost(&self, user_id: &str, range: &DateRange) -> Result<Decimal, TallyError>;

    /// Token and cost sums per distinct value of `field` inside `range`.
    ///
    /// Ordering of the returned groups is unspecified.
    async fn grouped_sums(
        &self,
        range: &DateRange,
        field: GroupField,
    ) -> Result<Vec<UsageGroup>, TallyError>;
}
