// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota record lookup and idempotent creation.

use std::str::FromStr;

use rusqlite::{Connection, params};
use tally_core::money::{from_nanos, to_nanos};
use tally_core::{QuotaKind, QuotaRecord, TallyError};

use super::{from_sql_int, to_sql_int};
use crate::database::{Database, map_tr_err};

fn select_quota(conn: &Connection, user_id: &str) -> Result<Option<QuotaRecord>, rusqlite::Error> {
    let result = conn.query_row(
        "SELECT user_id, daily_token_limit, monthly_cost_limit_nanos, reset_day, kind \
         FROM user_quotas WHERE user_id = ?1",
        params![user_id],
        |row| {
            let kind: String = row.get(4)?;
            let kind = QuotaKind::from_str(&kind).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(QuotaRecord {
                user_id: row.get(0)?,
                daily_token_limit: from_sql_int(row.get(1)?),
                monthly_cost_limit: from_nanos(row.get(2)?),
                reset_day: row.get(3)?,
                kind,
            })
        },
    );
    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fetch the quota record for a user.
pub async fn get_quota(db: &Database, user_id: &str) -> Result<Option<QuotaRecord>, TallyError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| select_quota(conn, &user_id))
        .await
        .map_err(map_tr_err)
}

/// Insert `defaults` unless the user already has a record, then return the stored record.
///
/// Insert and read run in one closure on the writer thread, so concurrent
/// first checks for the same user settle on a single row.
pub async fn create_default_quota(
    db: &Database,
    defaults: &QuotaRecord,
) -> Result<QuotaRecord, TallyError> {
    let record = defaults.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_quotas \
                 (user_id, daily_token_limit, monthly_cost_limit_nanos, reset_day, kind) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.user_id,
                    to_sql_int(record.daily_token_limit),
                    to_nanos(record.monthly_cost_limit),
                    record.reset_day,
                    record.kind.to_string(),
                ],
            )?;
            select_quota(conn, &record.user_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}
