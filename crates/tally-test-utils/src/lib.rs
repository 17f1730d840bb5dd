// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for Tally.
//!
//! - [`ManualClock`] - clock that only moves when told to
//! - [`MemoryLedger`] - in-memory ledger and quota store with failure injection
//! - [`FlakyKvStore`] - key-value store whose reads and writes can be made to fail

pub mod clock;
pub mod flaky_kv;
pub mod memory_ledger;

pub use clock::ManualClock;
pub use flaky_kv::FlakyKvStore;
pub use memory_ledger::MemoryLedger;
