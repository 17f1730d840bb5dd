// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable rendering of command results.

use std::fmt::Write as _;

use colored::Colorize;
use tally_cache::{CacheLookup, CacheSource};
use tally_core::{QuotaDecision, UsageGroup};
use tally_cost::{RecordedUsage, UsageReport};

pub fn render_recorded(recorded: &RecordedUsage, use_color: bool) -> String {
    let event = &recorded.event;
    let mut out = format!(
        "  {} {} tokens ({} in / {} out) on {} = {}\n",
        event.user_id,
        event.total_tokens,
        event.input_tokens,
        event.output_tokens,
        event.model,
        event.total_cost.normalize(),
    );
    if !recorded.persisted {
        let warning = "  not persisted: ledger unavailable";
        if use_color {
            let _ = writeln!(out, "{}", warning.yellow());
        } else {
            let _ = writeln!(out, "{warning}");
        }
    }
    out
}

pub fn render_decision(decision: &QuotaDecision, use_color: bool) -> String {
    let mut out = String::new();

    let verdict = match (decision.proceed, use_color) {
        (true, true) => "allowed".green().to_string(),
        (true, false) => "allowed".to_string(),
        (false, true) => "denied".red().bold().to_string(),
        (false, false) => "denied".to_string(),
    };
    let _ = writeln!(out, "  Quota for {}: {verdict}", decision.user_id);

    if let Some(error) = &decision.error {
        let line = format!("  check failed, allowing: {error}");
        if use_color {
            let _ = writeln!(out, "{}", line.yellow());
        } else {
            let _ = writeln!(out, "{line}");
        }
        return out;
    }

    if let Some(quota) = &decision.quota {
        let _ = writeln!(
            out,
            "    {:<16} {} used, {} remaining{}",
            "daily tokens",
            decision.daily_tokens_used,
            decision.daily_tokens_remaining,
            exceeded_marker(decision.daily_limit_exceeded, use_color),
        );
        let _ = writeln!(
            out,
            "    {:<16} {} used, {} remaining{}",
            "monthly cost",
            decision.monthly_cost_used.normalize(),
            decision.monthly_cost_remaining.normalize(),
            exceeded_marker(decision.monthly_limit_exceeded, use_color),
        );
        let _ = writeln!(out, "    {:<16} {} (resets day {})", "kind", quota.kind, quota.reset_day);
    }
    out
}

fn exceeded_marker(exceeded: bool, use_color: bool) -> String {
    match (exceeded, use_color) {
        (false, _) => String::new(),
        (true, true) => format!(" {}", "(limit reached)".red()),
        (true, false) => " (limit reached)".to_string(),
    }
}

pub fn render_report(lookup: &CacheLookup<UsageReport>, use_color: bool) -> String {
    let report = &lookup.value;
    let mut out = String::new();

    let title = format!("Usage report ({})", report.window);
    if use_color {
        let _ = writeln!(out, "\n  {}\n", title.bold());
    } else {
        let _ = writeln!(out, "\n  {title}\n");
    }
    let _ = writeln!(
        out,
        "  {} .. {}",
        report.range.start.format("%Y-%m-%d %H:%M"),
        report.range.end.format("%Y-%m-%d %H:%M"),
    );
    let source = match (lookup.source, lookup.age) {
        (CacheSource::Cache, Some(age)) => format!("cached, {}s old", age.as_secs()),
        _ => "fresh".to_string(),
    };
    let _ = writeln!(out, "  source: {source}");

    for (label, groups) in [
        ("By user", &report.by_user),
        ("By model", &report.by_model),
        ("By category", &report.by_category),
    ] {
        let _ = writeln!(out);
        if use_color {
            let _ = writeln!(out, "  {}", label.bold());
        } else {
            let _ = writeln!(out, "  {label}");
        }
        render_groups(&mut out, groups);
    }

    let _ = writeln!(
        out,
        "\n  Total: {} tokens, {}\n",
        report.total_tokens,
        report.total_cost.normalize()
    );
    out
}

fn render_groups(out: &mut String, groups: &[UsageGroup]) {
    if groups.is_empty() {
        let _ = writeln!(out, "    (no usage)");
        return;
    }
    for group in groups {
        let _ = writeln!(
            out,
            "    {:<24} {:>12} {:>14}",
            group.key,
            group.tokens,
            group.cost.normalize().to_string()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use tally_core::{
        CostBreakdown, DateRange, QuotaKind, QuotaRecord, ReportWindow, UsageEvent,
    };

    fn quota(kind: QuotaKind) -> QuotaRecord {
        QuotaRecord {
            user_id: "u1".into(),
            daily_token_limit: 200,
            monthly_cost_limit: Decimal::new(10, 0),
            reset_day: 1,
            kind,
        }
    }

    #[test]
    fn recorded_usage_shows_cost_and_persistence() {
        let cost = Decimal::from_str("0.0078").unwrap();
        let event = UsageEvent::new(
            "u1",
            "gpt-4",
            100,
            80,
            CostBreakdown {
                input_cost: Decimal::from_str("0.003").unwrap(),
                output_cost: Decimal::from_str("0.0048").unwrap(),
                total_cost: cost,
            },
            "chat",
            Utc::now(),
        );
        let persisted = RecordedUsage {
            event: event.clone(),
            persisted: true,
        };
        let text = render_recorded(&persisted, false);
        assert!(text.contains("180 tokens"));
        assert!(text.contains("0.0078"));
        assert!(!text.contains("not persisted"));

        let dropped = RecordedUsage {
            event,
            persisted: false,
        };
        assert!(render_recorded(&dropped, false).contains("not persisted"));
    }

    #[test]
    fn denied_decision_marks_the_breached_limit() {
        let decision = QuotaDecision::evaluate(quota(QuotaKind::Hard), 200, Decimal::ONE);
        let text = render_decision(&decision, false);
        assert!(text.contains("denied"));
        assert!(text.contains("200 used, 0 remaining (limit reached)"));
        assert!(text.contains("hard (resets day 1)"));
    }

    #[test]
    fn failed_open_decision_reports_the_error() {
        let decision = QuotaDecision::fail_open("u1", "store unavailable");
        let text = render_decision(&decision, false);
        assert!(text.contains("allowed"));
        assert!(text.contains("check failed, allowing: store unavailable"));
        assert!(!text.contains("daily tokens"));
    }

    #[test]
    fn report_lists_every_grouping() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let group = UsageGroup {
            key: "u1".into(),
            tokens: 180,
            cost: Decimal::from_str("0.0078").unwrap(),
        };
        let lookup = CacheLookup {
            value: UsageReport {
                window: ReportWindow::Day,
                range: DateRange::trailing(now, ReportWindow::Day),
                generated_at: now,
                by_user: vec![group.clone()],
                by_model: vec![UsageGroup {
                    key: "gpt-4".into(),
                    ..group.clone()
                }],
                by_category: Vec::new(),
                total_tokens: 180,
                total_cost: group.cost,
            },
            source: CacheSource::Cache,
            age: Some(Duration::from_secs(42)),
            key: "cache:report:day".into(),
        };

        let text = render_report(&lookup, false);
        assert!(text.contains("Usage report (day)"));
        assert!(text.contains("cached, 42s old"));
        assert!(text.contains("By user"));
        assert!(text.contains("gpt-4"));
        assert!(text.contains("(no usage)"));
        assert!(text.contains("Total: 180 tokens, 0.0078"));
    }
}
