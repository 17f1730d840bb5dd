// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end metering against the SQLite store.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tally_config::{PricingConfig, QuotaConfig, StorageConfig};
use tally_core::{QuotaKind, ReportWindow};
use tally_cost::{PriceTable, QuotaEngine, ReportAggregator, UsageLedger};
use tally_storage::{Database, SqliteStorage};
use tally_test_utils::ManualClock;

async fn storage() -> Arc<SqliteStorage> {
    let db = Database::open_in_memory().await.unwrap();
    Arc::new(SqliteStorage::from_database(StorageConfig::default(), db))
}

#[tokio::test]
async fn two_calls_collapse_into_one_user_row() {
    let storage = storage().await;
    let clock = Arc::new(ManualClock::fixed());
    let prices = Arc::new(PriceTable::from_config(&PricingConfig::default()).unwrap());

    let ledger = UsageLedger::new(storage.clone(), prices).with_clock(clock.clone());
    let quotas = QuotaEngine::new(storage.clone(), storage.clone(), QuotaConfig::default())
        .with_clock(clock.clone());
    let reports = ReportAggregator::new(storage.clone()).with_clock(clock.clone());

    let first = ledger.record_usage("u1", "gpt-4", 100, 50, None).await;
    let second = ledger.record_usage("u1", "gpt-4", 20, 10, None).await;
    assert!(first.persisted && second.persisted);
    assert_eq!(first.event.total_cost, Decimal::from_str("0.006").unwrap());
    assert_eq!(second.event.total_cost, Decimal::from_str("0.0012").unwrap());
    let spent = first.event.total_cost + second.event.total_cost;

    let decision = quotas.check_quota("u1").await;
    assert_eq!(decision.daily_tokens_used, 180);
    assert_eq!(decision.daily_tokens_remaining, 9_820);
    assert_eq!(decision.monthly_cost_used, spent);
    assert_eq!(
        decision.monthly_cost_remaining,
        Decimal::from_str("9.9928").unwrap()
    );
    assert_eq!(decision.quota.as_ref().unwrap().kind, QuotaKind::Soft);
    assert!(decision.proceed);

    let report = reports.generate_report(ReportWindow::Day).await.unwrap();
    assert_eq!(report.by_user.len(), 1);
    assert_eq!(report.by_user[0].key, "u1");
    assert_eq!(report.by_user[0].tokens, 180);
    assert_eq!(report.by_user[0].cost, spent);
    assert_eq!(report.by_model.len(), 1);
    assert_eq!(report.by_model[0].key, "gpt-4");
    assert_eq!(report.by_category[0].key, "text-completion");
    assert_eq!(report.total_tokens, 180);
    assert_eq!(report.total_cost, Decimal::from_str("0.0072").unwrap());
}

#[tokio::test]
async fn hard_quota_from_config_blocks_second_call() {
    let storage = storage().await;
    let clock = Arc::new(ManualClock::fixed());
    let prices = Arc::new(PriceTable::from_config(&PricingConfig::default()).unwrap());
    let defaults = QuotaConfig {
        daily_token_limit: 200,
        kind: QuotaKind::Hard,
        ..QuotaConfig::default()
    };

    let ledger = UsageLedger::new(storage.clone(), prices).with_clock(clock.clone());
    let quotas = QuotaEngine::new(storage.clone(), storage.clone(), defaults).with_clock(clock.clone());

    assert!(quotas.enforce("u1").await.is_ok());
    ledger.record_usage("u1", "gpt-4", 150, 50, Some("chat")).await;
    assert!(quotas.enforce("u1").await.is_err());

    clock.advance_secs(24 * 3600);
    assert!(quotas.enforce("u1").await.is_ok());
}
