// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the store traits and the metering components.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TallyError;

/// Request category used when the caller does not supply one.
pub const DEFAULT_REQUEST_CATEGORY: &str = "text-completion";

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of store behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    /// Usage ledger and quota records.
    Ledger,
    /// Key-value cache store.
    KeyValue,
}

/// Itemized cost of one interaction, already rounded to the monetary scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
}

/// One billed model interaction.
///
/// Created once per reported interaction and appended to the ledger; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique event identifier (UUID v4).
    pub id: String,
    pub user_id: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Always `input_tokens + output_tokens`.
    pub total_tokens: u64,
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    /// Always `input_cost + output_cost`.
    pub total_cost: Decimal,
    /// Free-form tag such as `chat` or `embedding`.
    pub request_category: String,
    pub created_at: DateTime<Utc>,
}

impl UsageEvent {
    /// Build an event from token counts and a priced breakdown.
    pub fn new(
        user_id: impl Into<String>,
        model: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        cost: CostBreakdown,
        request_category: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            model: model.into(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            input_cost: cost.input_cost,
            output_cost: cost.output_cost,
            total_cost: cost.total_cost,
            request_category: request_category.into(),
            created_at,
        }
    }
}

/// Whether a quota is advisory or enforced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    /// Advisory: breaches are reported but never block.
    #[default]
    Soft,
    /// Enforced: a breach denies the request.
    Hard,
}

/// Per-user limits. Exactly one record exists per user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub user_id: String,
    pub daily_token_limit: u64,
    pub monthly_cost_limit: Decimal,
    /// Informational reset day of month (1-28).
    pub reset_day: u8,
    pub kind: QuotaKind,
}

/// Outcome of a quota check. Derived on every call, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub user_id: String,
    /// The record that was applied; `None` when the check failed open.
    pub quota: Option<QuotaRecord>,
    pub daily_tokens_used: u64,
    pub monthly_cost_used: Decimal,
    /// `limit - used`; negative once the limit is overrun.
    pub daily_tokens_remaining: i64,
    /// `limit - used`; negative once the limit is overrun.
    pub monthly_cost_remaining: Decimal,
    pub daily_limit_exceeded: bool,
    pub monthly_limit_exceeded: bool,
    pub proceed: bool,
    /// Set when the check failed open.
    pub error: Option<String>,
}

impl QuotaDecision {
    /// Evaluate usage against a quota record.
    ///
    /// A limit counts as exceeded once nothing remains (`remaining <= 0`).
    /// Only a `hard` quota can deny.
    pub fn evaluate(quota: QuotaRecord, daily_tokens_used: u64, monthly_cost_used: Decimal) -> Self {
        let daily_tokens_remaining =
            saturating_i64(quota.daily_token_limit).saturating_sub(saturating_i64(daily_tokens_used));
        let monthly_cost_remaining = quota.monthly_cost_limit - monthly_cost_used;
        let daily_limit_exceeded = daily_tokens_remaining <= 0;
        let monthly_limit_exceeded = monthly_cost_remaining <= Decimal::ZERO;
        let proceed =
            !(quota.kind == QuotaKind::Hard && (daily_limit_exceeded || monthly_limit_exceeded));

        Self {
            user_id: quota.user_id.clone(),
            quota: Some(quota),
            daily_tokens_used,
            monthly_cost_used,
            daily_tokens_remaining,
            monthly_cost_remaining,
            daily_limit_exceeded,
            monthly_limit_exceeded,
            proceed,
            error: None,
        }
    }

    /// Permissive decision returned when the check itself failed.
    pub fn fail_open(user_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            quota: None,
            daily_tokens_used: 0,
            monthly_cost_used: Decimal::ZERO,
            daily_tokens_remaining: 0,
            monthly_cost_remaining: Decimal::ZERO,
            daily_limit_exceeded: false,
            monthly_limit_exceeded: false,
            proceed: true,
            error: Some(error.into()),
        }
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Half-open UTC time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The UTC calendar day containing `now`.
    pub fn day_of(now: DateTime<Utc>) -> Self {
        let start = midnight(now.date_naive());
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// The UTC calendar month containing `now`.
    pub fn month_of(now: DateTime<Utc>) -> Self {
        let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1).unwrap_or(now.date_naive());
        let next = if now.month() == 12 {
            NaiveDate::from_ymd_opt(now.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(now.year(), now.month() + 1, 1)
        }
        .unwrap_or(first + Duration::days(31));
        Self {
            start: midnight(first),
            end: midnight(next),
        }
    }

    /// The trailing window ending at `now` (not calendar aligned).
    ///
    /// `now` itself is covered: the end sits one microsecond, the resolution
    /// of stored timestamps, past it.
    pub fn trailing(now: DateTime<Utc>, window: ReportWindow) -> Self {
        Self {
            start: now - window.duration(),
            end: now + Duration::microseconds(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Trailing report window.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportWindow {
    /// Last 24 hours.
    #[default]
    Day,
    /// Last 7 days.
    Week,
    /// Last 30 days.
    Month,
}

impl ReportWindow {
    pub fn duration(self) -> Duration {
        match self {
            ReportWindow::Day => Duration::hours(24),
            ReportWindow::Week => Duration::days(7),
            ReportWindow::Month => Duration::days(30),
        }
    }

    /// Strict parse: unknown tags are a validation error.
    pub fn parse_strict(tag: &str) -> Result<Self, TallyError> {
        ReportWindow::from_str(tag.trim())
            .map_err(|_| TallyError::Validation(format!("unknown report window `{tag}`")))
    }

    /// Lenient parse: unknown tags fall back to [`ReportWindow::Day`].
    pub fn parse_lenient(tag: &str) -> Self {
        match Self::parse_strict(tag) {
            Ok(window) => window,
            Err(_) => {
                tracing::warn!(window = tag, "unknown report window, defaulting to day");
                ReportWindow::Day
            }
        }
    }
}

/// Ledger field a report groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    User,
    Model,
    RequestCategory,
}

/// Summed usage for one group key within a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageGroup {
    pub key: String,
    pub tokens: u64,
    pub cost: Decimal,
}

/// Sort groups by descending cost, breaking ties by key.
pub fn sort_by_cost_desc(groups: &mut [UsageGroup]) {
    groups.sort_by(|a, b| b.cost.cmp(&a.cost).then_with(|| a.key.cmp(&b.key)));
}
