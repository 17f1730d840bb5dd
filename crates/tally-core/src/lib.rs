// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Tally usage metering.
//!
//! This crate provides the error type, the data model (usage events, quota
//! records, decisions, report groups), the fixed-decimal money policy, and
//! the narrow store traits the metering and caching crates are written against.

pub mod clock;
pub mod deadline;
pub mod error;
pub mod money;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use deadline::with_deadline;
pub use error::TallyError;
pub use types::{
    AdapterType, CostBreakdown, DateRange, GroupField, HealthStatus, QuotaDecision, QuotaKind,
    QuotaRecord, ReportWindow, UsageEvent, UsageGroup,
};

pub use traits::{KeyTtl, KeyValueStore, LedgerStore, PluginAdapter, QuotaStore};
