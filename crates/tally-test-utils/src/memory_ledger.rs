// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory ledger and quota store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use tally_core::{
    AdapterType, DateRange, GroupField, HealthStatus, LedgerStore, PluginAdapter, QuotaRecord,
    QuotaStore, TallyError, UsageEvent, UsageGroup,
};

#[derive(Default)]
struct State {
    events: Vec<UsageEvent>,
    quotas: HashMap<String, QuotaRecord>,
}

/// Ledger and quota store backed by a `Vec` and a `HashMap`.
///
/// Appends, reads and quota calls can each be switched to fail, and every
/// call can be delayed to exercise deadlines. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<State>>,
    fail_appends: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    fail_quotas: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_quotas(&self, fail: bool) {
        self.fail_quotas.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `delay`.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().await = delay;
    }

    /// Snapshot of appended events, in append order.
    pub async fn events(&self) -> Vec<UsageEvent> {
        self.state.lock().await.events.clone()
    }

    /// Number of stored quota records.
    pub async fn quota_count(&self) -> usize {
        self.state.lock().await.quotas.len()
    }

    /// Replace a user's quota, as an administrator would.
    pub async fn put_quota(&self, record: QuotaRecord) {
        self.state
            .lock()
            .await
            .quotas
            .insert(record.user_id.clone(), record);
    }

    async fn enter(&self, flag: &AtomicBool, what: &str) -> Result<(), TallyError> {
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if flag.load(Ordering::SeqCst) {
            return Err(TallyError::StoreUnavailable {
                source: format!("injected {what} failure").into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for MemoryLedger {
    fn name(&self) -> &str {
        "memory-ledger"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Ledger
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("reads failing".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn append(&self, event: &UsageEvent) -> Result<(), TallyError> {
        self.enter(&self.fail_appends, "append").await?;
        self.state.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn sum_tokens(&self, user_id: &str, range: &DateRange) -> Result<u64, TallyError> {
        self.enter(&self.fail_reads, "read").await?;
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.user_id == user_id && range.contains(e.created_at))
            .map(|e| e.total_tokens)
            .sum())
    }

    async fn sum_cost(&self, user_id: &str, range: &DateRange) -> Result<Decimal, TallyError> {
        self.enter(&self.fail_reads, "read").await?;
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.user_id == user_id && range.contains(e.created_at))
            .map(|e| e.total_cost)
            .sum())
    }

    async fn grouped_sums(
        &self,
        range: &DateRange,
        field: GroupField,
    ) -> Result<Vec<UsageGroup>, TallyError> {
        self.enter(&self.fail_reads, "read").await?;
        let state = self.state.lock().await;
        let mut groups: HashMap<String, UsageGroup> = HashMap::new();
        for event in state.events.iter().filter(|e| range.contains(e.created_at)) {
            let key = match field {
                GroupField::User => &event.user_id,
                GroupField::Model => &event.model,
                GroupField::RequestCategory => &event.request_category,
            };
            let group = groups.entry(key.clone()).or_insert_with(|| UsageGroup {
                key: key.clone(),
                tokens: 0,
                cost: Decimal::ZERO,
            });
            group.tokens += event.total_tokens;
            group.cost += event.total_cost;
        }
        Ok(groups.into_values().collect())
    }
}

#[async_trait]
impl QuotaStore for MemoryLedger {
    async fn get(&self, user_id: &str) -> Result<Option<QuotaRecord>, TallyError> {
        self.enter(&self.fail_quotas, "quota").await?;
        Ok(self.state.lock().await.quotas.get(user_id).cloned())
    }

    async fn create_default(&self, defaults: &QuotaRecord) -> Result<QuotaRecord, TallyError> {
        self.enter(&self.fail_quotas, "quota").await?;
        let mut state = self.state.lock().await;
        Ok(state
            .quotas
            .entry(defaults.user_id.clone())
            .or_insert_with(|| defaults.clone())
            .clone())
    }
}
