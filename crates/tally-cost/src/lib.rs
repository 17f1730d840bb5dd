// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage metering for Tally.
//!
//! - **Pricing**: deterministic per-token cost from an injected price table
//! - **Usage ledger**: prices and appends usage events, degrading when the store fails
//! - **Quota engine**: daily token and monthly cost checks against per-user quotas
//! - **Reports**: trailing-window usage grouped by user, model and request category

pub mod ledger;
pub mod pricing;
pub mod quota;
pub mod report;

pub use ledger::{RecordedUsage, UsageLedger};
pub use pricing::PriceTable;
pub use quota::QuotaEngine;
pub use report::{ReportAggregator, UsageReport};
