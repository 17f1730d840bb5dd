// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota checks.
//!
//! A check loads (or lazily creates) the user's quota record, sums today's
//! tokens and this month's cost from the ledger, and derives a decision.
//! Checks fail open: if any store call fails or times out, the decision lets
//! the request proceed and carries the error text.
//!
//! Nothing is reserved between check and record, so concurrent requests from
//! one user can each pass and overrun a limit together. Totals catch up on the
//! next check.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tally_config::QuotaConfig;
use tally_core::{
    Clock, DateRange, LedgerStore, QuotaDecision, QuotaRecord, QuotaStore, SystemClock,
    TallyError, with_deadline,
};
use tracing::{debug, warn};

use crate::ledger::DEFAULT_STORE_TIMEOUT;

/// Evaluates per-user daily token and monthly cost quotas.
pub struct QuotaEngine {
    ledger: Arc<dyn LedgerStore>,
    quotas: Arc<dyn QuotaStore>,
    defaults: QuotaConfig,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl QuotaEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        quotas: Arc<dyn QuotaStore>,
        defaults: QuotaConfig,
    ) -> Self {
        Self {
            ledger,
            quotas,
            defaults,
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

    /// Decide whether `user_id` may proceed. Never fails.
    pub async fn check_quota(&self, user_id: &str) -> QuotaDecision {
        match self.evaluate(user_id).await {
            Ok(decision) => {
                self.warn_if_near_limit(&decision);
                decision
            }
            Err(e) => {
                warn!(user_id, error = %e, "quota check failed, allowing request");
                QuotaDecision::fail_open(user_id, e.to_string())
            }
        }
    }

    /// Like [`check_quota`](Self::check_quota) but turns a denial into
    /// [`TallyError::QuotaExceeded`].
    pub async fn enforce(&self, user_id: &str) -> Result<QuotaDecision, TallyError> {
        let decision = self.check_quota(user_id).await;
        if decision.proceed {
            return Ok(decision);
        }
        let message = match (decision.daily_limit_exceeded, decision.monthly_limit_exceeded) {
            (true, true) => "daily token and monthly cost limits reached",
            (true, false) => "daily token limit reached, resets at midnight UTC",
            _ => "monthly cost limit reached, resets at the start of next month",
        };
        Err(TallyError::QuotaExceeded {
            user_id: user_id.to_string(),
            message: message.to_string(),
        })
    }

    async fn evaluate(&self, user_id: &str) -> Result<QuotaDecision, TallyError> {
        let quota = self.load_or_create(user_id).await?;

        let now = self.clock.now();
        let today = DateRange::day_of(now);
        let month = DateRange::month_of(now);
        let (daily_tokens, monthly_cost) = tokio::try_join!(
            with_deadline(self.timeout, self.ledger.sum_tokens(user_id, &today)),
            with_deadline(self.timeout, self.ledger.sum_cost(user_id, &month)),
        )?;

        Ok(QuotaDecision::evaluate(quota, daily_tokens, monthly_cost))
    }

    async fn load_or_create(&self, user_id: &str) -> Result<QuotaRecord, TallyError> {
        if let Some(existing) = with_deadline(self.timeout, self.quotas.get(user_id)).await? {
            return Ok(existing);
        }
        let defaults = self.default_record(user_id);
        let stored = with_deadline(self.timeout, self.quotas.create_default(&defaults)).await?;
        debug!(user_id, kind = %stored.kind, "created default quota");
        Ok(stored)
    }

    fn default_record(&self, user_id: &str) -> QuotaRecord {
        QuotaRecord {
            user_id: user_id.to_string(),
            daily_token_limit: self.defaults.daily_token_limit,
            monthly_cost_limit: self.defaults.monthly_cost_limit,
            reset_day: self.defaults.reset_day,
            kind: self.defaults.kind,
        }
    }

    fn warn_if_near_limit(&self, decision: &QuotaDecision) {
        let Some(quota) = &decision.quota else {
            return;
        };
        let ratio = self.defaults.warn_ratio;

        if decision.daily_limit_exceeded {
            warn!(
                user_id = %decision.user_id,
                used = decision.daily_tokens_used,
                limit = quota.daily_token_limit,
                kind = %quota.kind,
                "daily token limit reached"
            );
        } else if quota.daily_token_limit > 0
            && decision.daily_tokens_used as f64 >= quota.daily_token_limit as f64 * ratio
        {
            warn!(
                user_id = %decision.user_id,
                used = decision.daily_tokens_used,
                limit = quota.daily_token_limit,
                "approaching daily token limit"
            );
        }

        let threshold = Decimal::from_f64(ratio).map(|r| quota.monthly_cost_limit * r);
        if decision.monthly_limit_exceeded {
            warn!(
                user_id = %decision.user_id,
                used = %decision.monthly_cost_used,
                limit = %quota.monthly_cost_limit,
                kind = %quota.kind,
                "monthly cost limit reached"
            );
        } else if let Some(threshold) = threshold
            && quota.monthly_cost_limit > Decimal::ZERO
            && decision.monthly_cost_used >= threshold
        {
            warn!(
                user_id = %decision.user_id,
                used = %decision.monthly_cost_used,
                limit = %quota.monthly_cost_limit,
                "approaching monthly cost limit"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::str::FromStr;
    use tally_core::{CostBreakdown, QuotaKind, UsageEvent};
    use tally_test_utils::{ManualClock, MemoryLedger};
    use tracing_test::traced_test;

    fn engine(store: &MemoryLedger, clock: &ManualClock) -> QuotaEngine {
        QuotaEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            QuotaConfig::default(),
        )
        .with_clock(Arc::new(clock.clone()))
    }

    async fn seed(store: &MemoryLedger, clock: &ManualClock, tokens: u64, cost: &str) {
        let cost = Decimal::from_str(cost).unwrap();
        let event = UsageEvent::new(
            "u1",
            "gpt-4",
            tokens,
            0,
            CostBreakdown {
                input_cost: cost,
                output_cost: Decimal::ZERO,
                total_cost: cost,
            },
            "chat",
            clock.now(),
        );
        store.append(&event).await.unwrap();
    }

    async fn set_quota(store: &MemoryLedger, kind: QuotaKind, tokens: u64, cost: i64) {
        store
            .put_quota(QuotaRecord {
                user_id: "u1".into(),
                daily_token_limit: tokens,
                monthly_cost_limit: Decimal::new(cost, 0),
                reset_day: 1,
                kind,
            })
            .await;
    }

    #[tokio::test]
    async fn first_check_creates_default_quota() {
        let store = MemoryLedger::new();
        let decision = engine(&store, &ManualClock::fixed()).check_quota("new-user").await;

        let quota = decision.quota.unwrap();
        assert_eq!(quota.daily_token_limit, 10_000);
        assert_eq!(quota.monthly_cost_limit, Decimal::new(10, 0));
        assert_eq!(quota.kind, QuotaKind::Soft);
        assert_eq!(decision.daily_tokens_remaining, 10_000);
        assert!(decision.proceed);
        assert!(decision.error.is_none());

        let again = engine(&store, &ManualClock::fixed()).check_quota("new-user").await;
        assert_eq!(again.quota.unwrap().daily_token_limit, 10_000);
        assert_eq!(store.quota_count().await, 1);
    }

    #[tokio::test]
    async fn soft_quota_never_blocks() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        set_quota(&store, QuotaKind::Soft, 100, 1).await;
        seed(&store, &clock, 500, "5").await;

        let decision = engine(&store, &clock).check_quota("u1").await;
        assert!(decision.daily_limit_exceeded);
        assert!(decision.monthly_limit_exceeded);
        assert_eq!(decision.daily_tokens_remaining, -400);
        assert!(decision.proceed);
    }

    #[tokio::test]
    async fn hard_quota_blocks_at_limit() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        set_quota(&store, QuotaKind::Hard, 100, 10).await;
        seed(&store, &clock, 99, "0.01").await;

        let engine = engine(&store, &clock);
        assert!(engine.check_quota("u1").await.proceed);

        seed(&store, &clock, 1, "0").await;
        let decision = engine.check_quota("u1").await;
        assert_eq!(decision.daily_tokens_remaining, 0);
        assert!(decision.daily_limit_exceeded);
        assert!(!decision.proceed);

        let err = engine.enforce("u1").await.unwrap_err();
        assert!(matches!(err, TallyError::QuotaExceeded { ref user_id, .. } if user_id == "u1"));
    }

    #[tokio::test]
    async fn daily_tokens_reset_at_utc_midnight() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        set_quota(&store, QuotaKind::Hard, 100, 10).await;
        seed(&store, &clock, 100, "0.5").await;

        let engine = engine(&store, &clock);
        assert!(!engine.check_quota("u1").await.proceed);

        clock.advance(ChronoDuration::hours(12));
        let decision = engine.check_quota("u1").await;
        assert_eq!(decision.daily_tokens_used, 0);
        assert_eq!(decision.monthly_cost_used, Decimal::new(5, 1));
        assert!(decision.proceed);
    }

    #[tokio::test]
    async fn monthly_cost_counts_whole_month() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        set_quota(&store, QuotaKind::Hard, 1_000_000, 1).await;
        clock.advance(ChronoDuration::days(-10));
        seed(&store, &clock, 10, "0.6").await;
        clock.advance(ChronoDuration::days(10));
        seed(&store, &clock, 10, "0.4").await;

        let decision = engine(&store, &clock).check_quota("u1").await;
        assert_eq!(decision.monthly_cost_used, Decimal::ONE);
        assert!(decision.monthly_limit_exceeded);
        assert!(!decision.proceed);
        assert!(engine(&store, &clock).enforce("u1").await.is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn store_failure_fails_open() {
        let store = MemoryLedger::new();
        set_quota(&store, QuotaKind::Hard, 0, 0).await;
        store.fail_reads(true);

        let decision = engine(&store, &ManualClock::fixed()).check_quota("u1").await;
        assert!(decision.proceed);
        assert!(decision.quota.is_none());
        assert!(decision.error.unwrap().contains("injected read failure"));
        assert!(logs_contain("quota check failed"));
    }

    #[tokio::test]
    async fn quota_store_failure_fails_open() {
        let store = MemoryLedger::new();
        store.fail_quotas(true);
        let engine = engine(&store, &ManualClock::fixed());
        assert!(engine.check_quota("u1").await.proceed);
        assert!(engine.enforce("u1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_fails_open() {
        let store = MemoryLedger::new();
        store.set_delay(Some(std::time::Duration::from_secs(60))).await;
        let engine = engine(&store, &ManualClock::fixed()).with_timeout(std::time::Duration::from_millis(100));

        let decision = engine.check_quota("u1").await;
        assert!(decision.proceed);
        assert!(decision.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    #[traced_test]
    async fn warns_when_approaching_limit() {
        let store = MemoryLedger::new();
        let clock = ManualClock::fixed();
        set_quota(&store, QuotaKind::Soft, 1000, 100).await;
        seed(&store, &clock, 850, "1").await;

        let decision = engine(&store, &clock).check_quota("u1").await;
        assert!(!decision.daily_limit_exceeded);
        assert!(logs_contain("approaching daily token limit"));
        assert!(!logs_contain("approaching monthly cost limit"));
    }
}
