use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::models::funnel::MetricsSnapshot;
use crate::models::series::{DailyRow, DailySeries, PeriodComparison, SourcePerformance, TrendPoint};
use crate::services::metrics_engine::percentage;

pub const UNKNOWN_SOURCE: &str = "Unknown";

pub fn daily_trends(series: &DailySeries) -> Vec<TrendPoint> {
    series
        .rows()
        .iter()
        .map(|row| {
            let total = row.counts.total_leads();
            TrendPoint {
                date: row.date,
                total_leads: total,
                qualified_leads: row.counts.qualified_leads(),
                closed_sales: row.counts.closed_sales(),
                qualification_rate: percentage(row.counts.qualified_leads(), total),
                close_rate: percentage(row.counts.closed_sales(), total),
                cost_per_lead: cost_per_lead(row.daily_budget, total),
            }
        })
        .collect()
}

#[derive(Default)]
struct SourceTotals {
    leads: u64,
    qualified: u64,
    closed: u64,
    spend: f64,
}

/// Per-channel totals, busiest source first. Rows without a source label
/// are grouped under [`UNKNOWN_SOURCE`].
pub fn source_breakdown(series: &DailySeries) -> Vec<SourcePerformance> {
    let mut grouped: HashMap<String, SourceTotals> = HashMap::new();
    for row in series.rows() {
        let entry = grouped.entry(source_label(row)).or_default();
        entry.leads = entry.leads.saturating_add(row.counts.total_leads());
        entry.qualified = entry.qualified.saturating_add(row.counts.qualified_leads());
        entry.closed = entry.closed.saturating_add(row.counts.closed_sales());
        entry.spend += row.daily_budget.unwrap_or(0.0);
    }

    let mut performance: Vec<SourcePerformance> = grouped
        .into_iter()
        .map(|(source, totals)| SourcePerformance {
            source,
            leads: totals.leads,
            qualified: totals.qualified,
            closed: totals.closed,
            qualification_rate: percentage(totals.qualified, totals.leads),
            win_rate: percentage(totals.closed, totals.leads),
            spend: totals.spend,
            cost_per_lead: if totals.spend > 0.0 {
                cost_per_lead(Some(totals.spend), totals.leads)
            } else {
                None
            },
        })
        .collect();

    performance.sort_by(|left, right| {
        right
            .leads
            .cmp(&left.leads)
            .then_with(|| left.source.cmp(&right.source))
    });
    performance
}

/// Compares the latest `window_days` (ending at the last row's date) with
/// the window of the same length just before it.
pub fn period_comparison(series: &DailySeries, window_days: u32) -> Option<PeriodComparison> {
    if window_days == 0 {
        return None;
    }
    let current_end = series.last_date()?;
    let span = Duration::days(i64::from(window_days));
    // Windows reaching past the calendar range yield no comparison.
    let current_start = current_end
        .checked_sub_signed(span)?
        .checked_add_signed(Duration::days(1))?;
    let previous_end = current_start.checked_sub_signed(Duration::days(1))?;
    let previous_start = current_start.checked_sub_signed(span)?;

    let current = window_totals(series, current_start, current_end);
    let previous = window_totals(series, previous_start, previous_end);

    Some(PeriodComparison {
        window_days,
        current_start,
        current_end,
        current_leads: current.total_leads(),
        previous_leads: previous.total_leads(),
        current_closed: current.closed_sales(),
        previous_closed: previous.closed_sales(),
        lead_growth: growth(current.total_leads(), previous.total_leads()),
        close_growth: growth(current.closed_sales(), previous.closed_sales()),
    })
}

/// Sums every row of the series into one snapshot.
pub fn series_snapshot(series: &DailySeries) -> MetricsSnapshot {
    series
        .rows()
        .iter()
        .fold(MetricsSnapshot::default(), |acc, row| acc.combined(&row.counts))
}

fn window_totals(series: &DailySeries, start: NaiveDate, end: NaiveDate) -> MetricsSnapshot {
    series
        .rows()
        .iter()
        .filter(|row| row.date >= start && row.date <= end)
        .fold(MetricsSnapshot::default(), |acc, row| acc.combined(&row.counts))
}

fn source_label(row: &DailyRow) -> String {
    row.source
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}

fn cost_per_lead(budget: Option<f64>, leads: u64) -> Option<f64> {
    match budget {
        Some(amount) if leads > 0 => Some(amount / leads as f64),
        _ => None,
    }
}

fn growth(current: u64, previous: u64) -> Option<f64> {
    if previous == 0 {
        None
    } else {
        Some((current as f64 - previous as f64) / previous as f64 * 100.0)
    }
}
