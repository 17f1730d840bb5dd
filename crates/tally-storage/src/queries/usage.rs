// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ledger appends and aggregate queries.

use rusqlite::params;
use rust_decimal::Decimal;
use tally_core::money::{from_nanos, to_nanos};
use tally_core::{DateRange, GroupField, TallyError, UsageEvent, UsageGroup};

use super::{from_sql_int, to_sql_int};
use crate::database::{Database, format_timestamp, map_tr_err};

/// Insert one usage event.
pub async fn insert_event(db: &Database, event: &UsageEvent) -> Result<(), TallyError> {
    let id = event.id.clone();
    let user_id = event.user_id.clone();
    let model = event.model.clone();
    let request_category = event.request_category.clone();
    let input_tokens = to_sql_int(event.input_tokens);
    let output_tokens = to_sql_int(event.output_tokens);
    let total_tokens = to_sql_int(event.total_tokens);
    let input_cost = to_nanos(event.input_cost);
    let output_cost = to_nanos(event.output_cost);
    let total_cost = to_nanos(event.total_cost);
    let created_at = format_timestamp(event.created_at);

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO usage_ledger (id, user_id, model, input_tokens, output_tokens, \
                 total_tokens, input_cost_nanos, output_cost_nanos, total_cost_nanos, \
                 request_category, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    user_id,
                    model,
                    input_tokens,
                    output_tokens,
                    total_tokens,
                    input_cost,
                    output_cost,
                    total_cost,
                    request_category,
                    created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Sum of `total_tokens` for a user inside the range.
pub async fn sum_tokens(db: &Database, user_id: &str, range: &DateRange) -> Result<u64, TallyError> {
    let total = sum_column(db, "total_tokens", user_id, range).await?;
    Ok(from_sql_int(total))
}

/// Sum of `total_cost` for a user inside the range.
pub async fn sum_cost(db: &Database, user_id: &str, range: &DateRange) -> Result<Decimal, TallyError> {
    let nanos = sum_column(db, "total_cost_nanos", user_id, range).await?;
    Ok(from_nanos(nanos))
}

async fn sum_column(
    db: &Database,
    column: &'static str,
    user_id: &str,
    range: &DateRange,
) -> Result<i64, TallyError> {
    let user_id = user_id.to_string();
    let start = format_timestamp(range.start);
    let end = format_timestamp(range.end);
    let sql = format!(
        "SELECT COALESCE(SUM({column}), 0) FROM usage_ledger \
         WHERE user_id = ?1 AND created_at >= ?2 AND created_at < ?3"
    );

    db.connection()
        .call(move |conn| conn.query_row(&sql, params![user_id, start, end], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}

fn group_column(field: GroupField) -> &'static str {
    match field {
        GroupField::User => "user_id",
        GroupField::Model => "model",
        GroupField::RequestCategory => "request_category",
    }
}

/// Token and cost sums per distinct value of `field` inside the range.
pub async fn grouped_sums(
    db: &Database,
    range: &DateRange,
    field: GroupField,
) -> Result<Vec<UsageGroup>, TallyError> {
    let column = group_column(field);
    let start = format_timestamp(range.start);
    let end = format_timestamp(range.end);
    let sql = format!(
        "SELECT {column}, COALESCE(SUM(total_tokens), 0), COALESCE(SUM(total_cost_nanos), 0) \
         FROM usage_ledger WHERE created_at >= ?1 AND created_at < ?2 GROUP BY {column}"
    );

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![start, end], |row| {
                Ok(UsageGroup {
                    key: row.get(0)?,
                    tokens: from_sql_int(row.get(1)?),
                    cost: from_nanos(row.get(2)?),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::str::FromStr;
    use tally_core::CostBreakdown;

    fn event(user: &str, model: &str, tokens: u64, cost: &str, category: &str, hours_ago: i64) -> UsageEvent {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let cost = Decimal::from_str(cost).unwrap();
        UsageEvent::new(
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
            now - Duration::hours(hours_ago),
        )
    }

    fn window() -> DateRange {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        DateRange::new(now - Duration::hours(24), now)
    }

    #[tokio::test]
    async fn sums_respect_user_and_range() {
        let db = Database::open_in_memory().await.unwrap();
        insert_event(&db, &event("u1", "gpt-4", 100, "0.003", "chat", 1)).await.unwrap();
        insert_event(&db, &event("u1", "gpt-4", 50, "0.0015", "chat", 2)).await.unwrap();
        insert_event(&db, &event("u2", "gpt-4", 70, "0.002", "chat", 1)).await.unwrap();
        insert_event(&db, &event("u1", "gpt-4", 999, "9", "chat", 48)).await.unwrap();

        assert_eq!(sum_tokens(&db, "u1", &window()).await.unwrap(), 150);
        assert_eq!(
            sum_cost(&db, "u1", &window()).await.unwrap(),
            Decimal::from_str("0.0045").unwrap()
        );
        assert_eq!(sum_tokens(&db, "nobody", &window()).await.unwrap(), 0);
        assert_eq!(sum_cost(&db, "nobody", &window()).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn range_end_is_exclusive() {
        let db = Database::open_in_memory().await.unwrap();
        insert_event(&db, &event("u1", "gpt-4", 10, "0", "chat", 0)).await.unwrap();
        insert_event(&db, &event("u1", "gpt-4", 20, "0", "chat", 24)).await.unwrap();
        // Event at `now` equals range.end and falls outside; the one 24h back equals start and counts.
        assert_eq!(sum_tokens(&db, "u1", &window()).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn grouped_sums_by_each_field() {
        let db = Database::open_in_memory().await.unwrap();
        insert_event(&db, &event("u1", "gpt-4", 100, "0.003", "chat", 1)).await.unwrap();
        insert_event(&db, &event("u2", "gpt-3.5-turbo", 40, "0.00006", "embedding", 1)).await.unwrap();
        insert_event(&db, &event("u1", "gpt-3.5-turbo", 60, "0.00009", "chat", 3)).await.unwrap();

        let mut by_user = grouped_sums(&db, &window(), GroupField::User).await.unwrap();
        by_user.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(by_user.len(), 2);
        assert_eq!(by_user[0].key, "u1");
        assert_eq!(by_user[0].tokens, 160);
        assert_eq!(by_user[0].cost, Decimal::from_str("0.00309").unwrap());

        let by_model = grouped_sums(&db, &window(), GroupField::Model).await.unwrap();
        let turbo = by_model.iter().find(|g| g.key == "gpt-3.5-turbo").unwrap();
        assert_eq!(turbo.tokens, 100);
        assert_eq!(turbo.cost, Decimal::from_str("0.00015").unwrap());

        let by_category = grouped_sums(&db, &window(), GroupField::RequestCategory).await.unwrap();
        assert_eq!(by_category.len(), 2);
        let total: u64 = by_category.iter().map(|g| g.tokens).sum();
        assert_eq!(total, 200);
    }

    #[tokio::test]
    async fn empty_window_has_no_groups() {
        let db = Database::open_in_memory().await.unwrap();
        let groups = grouped_sums(&db, &window(), GroupField::Model).await.unwrap();
        assert!(groups.is_empty());
    }
}
