// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Narrow store interfaces consumed by the metering and caching components.
//!
//! All stores extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod kv;
pub mod ledger;
pub mod quota;

pub use adapter::PluginAdapter;
pub use kv::{KeyTtl, KeyValueStore};
pub use ledger::LedgerStore;
pub use quota::QuotaStore;
