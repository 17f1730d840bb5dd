// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed queries over the ledger and quota tables.

pub mod quotas;
pub mod usage;

/// Convert a count for binding as SQLite INTEGER.
pub(crate) fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Convert a summed SQLite INTEGER back to a count. Negative sums cannot occur.
pub(crate) fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
