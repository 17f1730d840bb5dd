// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trailing-window usage reports.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::types::sort_by_cost_desc;
use tally_core::{
    Clock, DateRange, GroupField, LedgerStore, ReportWindow, SystemClock, TallyError, UsageGroup,
    with_deadline,
};
use tracing::debug;

use crate::ledger::DEFAULT_STORE_TIMEOUT;

/// Usage over one trailing window, grouped three ways.
///
/// Each grouping partitions the same events, so the token and cost sums of
/// `by_user`, `by_model` and `by_category` all equal the grand totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub window: ReportWindow,
    pub range: DateRange,
    pub generated_at: DateTime<Utc>,
    pub by_user: Vec<UsageGroup>,
    pub by_model: Vec<UsageGroup>,
    pub by_category: Vec<UsageGroup>,
    pub total_tokens: u64,
    pub total_cost: Decimal,
}

/// Builds [`UsageReport`]s from ledger aggregates.
pub struct ReportAggregator {
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl ReportAggregator {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Report for the window ending now. Store failures surface as errors.
    pub async fn generate_report(&self, window: ReportWindow) -> Result<UsageReport, TallyError> {
        let generated_at = self.clock.now();
        let range = DateRange::trailing(generated_at, window);

        let (mut by_user, mut by_model, mut by_category) = tokio::try_join!(
            self.grouped(&range, GroupField::User),
            self.grouped(&range, GroupField::Model),
            self.grouped(&range, GroupField::RequestCategory),
        )?;
        sort_by_cost_desc(&mut by_user);
        sort_by_cost_desc(&mut by_model);
        sort_by_cost_desc(&mut by_category);

        let total_tokens = by_user.iter().map(|g| g.tokens).sum();
        let total_cost = by_user.iter().map(|g| g.cost).sum();
        debug!(%window, users = by_user.len(), total_tokens, "report generated");

        Ok(UsageReport {
            window,
            range,
            generated_at,
            by_user,
            by_model,
            by_category,
            total_tokens,
            total_cost,
        })
    }

    /// Report for a window tag such as `"week"`; unknown tags mean `day`.
    pub async fn generate_report_for(&self, tag: &str) -> Result<UsageReport, TallyError> {
        self.generate_report(ReportWindow::parse_lenient(tag)).await
    }

    async fn grouped(
        &self,
        range: &DateRange,
        field: GroupField,
    ) -> Result<Vec<UsageGroup>, TallyError> {
        with_deadline(self.timeout, self.ledger.grouped_sums(range, field)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::str::FromStr;
    use tally_core::{CostBreakdown, UsageEvent};
    use tally_test_utils::{ManualClock, MemoryLedger};

    async fn seed(
        store: &MemoryLedger,
        at: DateTime<Utc>,
        user: &str,
        model: &str,
        category: &str,
        tokens: u64,
        cost: &str,
    ) {
        let cost = Decimal::from_str(cost).unwrap();
        let event = UsageEvent::new(
            user,
            model,
            tokens,
            0,
            CostBreakdown {
                input_cost: cost,
                output_cost: Decimal::ZERO,
                total_cost: cost,
            },
            category,
            at,
        );
        store.append(&event).await.unwrap();
    }

    fn aggregator(store: &MemoryLedger, clock: &ManualClock) -> ReportAggregator {
        ReportAggregator::new(Arc::new(store.clone())).with_clock(Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn groups_are_sorted_by_cost_then_key() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        let now = clock.now();
        seed(&store, now, "alice", "gpt-4", "chat", 10, "0.5").await;
        seed(&store, now, "bob", "gpt-4", "chat", 10, "2").await;
        seed(&store, now, "carol", "local-llm", "embedding", 10, "0.5").await;

        let report = aggregator(&store, &clock).generate_report(ReportWindow::Day).await.unwrap();
        let users: Vec<&str> = report.by_user.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(users, vec!["bob", "alice", "carol"]);
        assert_eq!(report.by_model[0].key, "gpt-4");
        assert_eq!(report.by_model[0].cost, Decimal::from_str("2.5").unwrap());
    }

    #[tokio::test]
    async fn partitions_reconcile_with_totals() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        let now = clock.now();
        seed(&store, now, "u1", "gpt-4", "chat", 180, "0.0078").await;
        seed(&store, now - ChronoDuration::hours(3), "u2", "gpt-3.5-turbo", "summary", 1500, "0.0025").await;
        seed(&store, now - ChronoDuration::hours(30), "u2", "gpt-4", "chat", 40, "0.1").await;

        for window in [ReportWindow::Day, ReportWindow::Week, ReportWindow::Month] {
            let report = aggregator(&store, &clock).generate_report(window).await.unwrap();
            for groups in [&report.by_user, &report.by_model, &report.by_category] {
                assert_eq!(groups.iter().map(|g| g.tokens).sum::<u64>(), report.total_tokens);
                assert_eq!(groups.iter().map(|g| g.cost).sum::<Decimal>(), report.total_cost);
            }
        }

        let day = aggregator(&store, &clock).generate_report(ReportWindow::Day).await.unwrap();
        assert_eq!(day.total_tokens, 1680);
        let week = aggregator(&store, &clock).generate_report(ReportWindow::Week).await.unwrap();
        assert_eq!(week.total_tokens, 1720);
    }

    #[tokio::test]
    async fn report_echoes_window_bounds() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        let report = aggregator(&store, &clock).generate_report(ReportWindow::Week).await.unwrap();
        assert_eq!(report.window, ReportWindow::Week);
        assert!(report.range.contains(clock.now()));
        assert_eq!(report.range.start, clock.now() - ChronoDuration::days(7));
        assert_eq!(report.generated_at, clock.now());
        assert!(report.by_user.is_empty());
        assert_eq!(report.total_cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn unknown_window_tag_means_day() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        let report = aggregator(&store, &clock).generate_report_for("fortnight").await.unwrap();
        assert_eq!(report.window, ReportWindow::Day);
    }

    #[tokio::test]
    async fn store_failure_surfaces() {
        let store = MemoryLedger::new();
        store.fail_reads(true);
        let err = aggregator(&store, &ManualClock::fixed())
            .generate_report(ReportWindow::Day)
            .await
            .unwrap_err();
        assert!(err.is_store_failure());
    }

    #[tokio::test]
    async fn report_round_trips_through_json() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        seed(&store, clock.now(), "u1", "gpt-4", "chat", 180, "0.0078").await;
        let report = aggregator(&store, &clock).generate_report(ReportWindow::Day).await.unwrap();
        let json = serde_json::to_vec(&report).unwrap();
        let back: UsageReport = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, report);
    }
}
