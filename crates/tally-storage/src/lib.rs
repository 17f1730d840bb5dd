// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Tally.
//!
//! WAL-mode SQLite with embedded migrations and a single writer thread via
//! `tokio-rusqlite`. [`SqliteStorage`] implements both the usage ledger and
//! the quota store on one database file.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
