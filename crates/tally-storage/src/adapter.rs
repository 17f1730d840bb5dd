// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the ledger and quota store traits.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::OnceCell;
use tracing::debug;

use tally_config::StorageConfig;
use tally_core::{
    AdapterType, DateRange, GroupField, HealthStatus, LedgerStore, PluginAdapter, QuotaRecord,
    QuotaStore, TallyError, UsageEvent, UsageGroup,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed ledger and quota store.
///
/// The database is opened lazily by [`SqliteStorage::initialize`]; every
/// other call fails with a store error until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Open the database at the configured path and run migrations.
    pub async fn initialize(&self) -> Result<(), TallyError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| TallyError::Internal("storage already initialized".into()))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    /// Wrap an already open database.
    pub fn from_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, TallyError> {
        self.db.get().ok_or_else(|| TallyError::StoreUnavailable {
            source: "storage not initialized, call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Ledger
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        let answer = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err);
        Ok(match answer {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        if let Some(db) = self.db.get()
            && self.config.wal_mode
        {
            db.checkpoint().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SqliteStorage {
    async fn append(&self, event: &UsageEvent) -> Result<(), TallyError> {
        queries::usage::insert_event(self.db()?, event).await
    }

    async fn sum_tokens(&self, user_id: &str, range: &DateRange) -> Result<u64, TallyError> {
        queries::usage::sum_tokens(self.db()?, user_id, range).await
    }

    async fn sum_cost(&self, user_id: &str, range: &DateRange) -> Result<Decimal, TallyError> {
        queries::usage::sum_cost(self.db()?, user_id, range).await
    }

    async fn grouped_sums(
        &self,
        range: &DateRange,
        field: GroupField,
    ) -> Result<Vec<UsageGroup>, TallyError> {
        queries::usage::grouped_sums(self.db()?, range, field).await
    }
}

#[async_trait]
impl QuotaStore for SqliteStorage {
    async fn get(&self, user_id: &str) -> Result<Option<QuotaRecord>, TallyError> {
        queries::quotas::get_quota(self.db()?, user_id).await
    }

    async fn create_default(&self, defaults: &QuotaRecord) -> Result<QuotaRecord, TallyError> {
        queries::quotas::create_default_quota(self.db()?, defaults).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tally_core::{CostBreakdown, QuotaKind};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
            store_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn identifies_as_ledger_adapter() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.adapter_type(), AdapterType::Ledger);
    }

    #[tokio::test]
    async fn calls_before_initialize_are_store_failures() {
        let storage = SqliteStorage::new(make_config("unused.db"));
        let range = DateRange::day_of(Utc::now());
        let err = storage.sum_tokens("u1", &range).await.unwrap_err();
        assert!(err.is_store_failure());
        assert!(matches!(
            storage.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tally.db");
        let storage = SqliteStorage::new(make_config(path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn events_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tally.db");
        let now = Utc::now();
        let range = DateRange::new(now - Duration::hours(1), now + Duration::hours(1));

        {
            let storage = SqliteStorage::new(make_config(path.to_str().unwrap()));
            storage.initialize().await.unwrap();
            let event = UsageEvent::new(
                "u1",
                "gpt-4",
                100,
                80,
                CostBreakdown {
                    input_cost: Decimal::new(3, 3),
                    output_cost: Decimal::new(48, 4),
                    total_cost: Decimal::new(78, 4),
                },
                "chat",
                now,
            );
            storage.append(&event).await.unwrap();
            assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
            storage.shutdown().await.unwrap();
        }

        let storage = SqliteStorage::new(make_config(path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert_eq!(storage.sum_tokens("u1", &range).await.unwrap(), 180);
        assert_eq!(storage.sum_cost("u1", &range).await.unwrap(), Decimal::new(78, 4));
    }

    #[tokio::test]
    async fn concurrent_default_creation_yields_one_record() {
        let db = Database::open_in_memory().await.unwrap();
        let storage = Arc::new(SqliteStorage::from_database(make_config(":memory:"), db));

        let mut handles = Vec::new();
        for limit in 1..=8u64 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage
                    .create_default(&QuotaRecord {
                        user_id: "u1".into(),
                        daily_token_limit: limit,
                        monthly_cost_limit: Decimal::ONE,
                        reset_day: 1,
                        kind: QuotaKind::Soft,
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut records = Vec::new();
        for handle in handles {
            records.push(handle.await.unwrap());
        }
        assert!(records.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(storage.get("u1").await.unwrap(), Some(records[0].clone()));
    }
}
