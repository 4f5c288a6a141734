use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::funnel::MetricsSnapshot;

pub const DAILY_WORKSHEET: &str = "Daily";
pub const ENGAGEMENT_WORKSHEET: &str = "WhatsApp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRow {
    pub date: NaiveDate,
    pub counts: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Daily rows ordered by date with unique dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DailySeries {
    rows: Vec<DailyRow>,
}

impl DailySeries {
    /// Orders rows by date; for a repeated date the later row wins.
    pub fn new(rows: Vec<DailyRow>) -> Self {
        Self {
            rows: dedup_by_date(rows, |row| row.date),
        }
    }

    pub fn rows(&self) -> &[DailyRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|row| row.date)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementCounts {
    pub messages_answered: u64,
    pub positive: u64,
    pub negative: u64,
    pub relevant: u64,
    pub irrelevant: u64,
    pub scheduled_leads: u64,
}

impl EngagementCounts {
    pub fn combined(&self, other: &EngagementCounts) -> EngagementCounts {
        EngagementCounts {
            messages_answered: self.messages_answered.saturating_add(other.messages_answered),
            positive: self.positive.saturating_add(other.positive),
            negative: self.negative.saturating_add(other.negative),
            relevant: self.relevant.saturating_add(other.relevant),
            irrelevant: self.irrelevant.saturating_add(other.irrelevant),
            scheduled_leads: self.scheduled_leads.saturating_add(other.scheduled_leads),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementRow {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub counts: EngagementCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EngagementSeries {
    rows: Vec<EngagementRow>,
}

impl EngagementSeries {
    pub fn new(rows: Vec<EngagementRow>) -> Self {
        Self {
            rows: dedup_by_date(rows, |row| row.date),
        }
    }

    pub fn rows(&self) -> &[EngagementRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

fn dedup_by_date<T>(rows: Vec<T>, date_of: impl Fn(&T) -> NaiveDate) -> Vec<T> {
    let mut indexed: Vec<(usize, T)> = rows.into_iter().enumerate().collect();
    // Later input rows sort after earlier ones on the same date.
    indexed.sort_by(|(left_idx, left), (right_idx, right)| {
        date_of(left)
            .cmp(&date_of(right))
            .then(left_idx.cmp(right_idx))
    });

    let mut result: Vec<T> = Vec::with_capacity(indexed.len());
    for (_, row) in indexed {
        match result.last_mut() {
            Some(previous) if date_of(previous) == date_of(&row) => *previous = row,
            _ => result.push(row),
        }
    }
    result
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub total_leads: u64,
    pub qualified_leads: u64,
    pub closed_sales: u64,
    pub qualification_rate: f64,
    pub close_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_lead: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePerformance {
    pub source: String,
    pub leads: u64,
    pub qualified: u64,
    pub closed: u64,
    pub qualification_rate: f64,
    pub win_rate: f64,
    pub spend: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_lead: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub window_days: u32,
    pub current_start: NaiveDate,
    pub current_end: NaiveDate,
    pub current_leads: u64,
    pub previous_leads: u64,
    pub current_closed: u64,
    pub previous_closed: u64,
    /// `None` when the previous window had no leads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_growth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_growth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementPoint {
    pub date: NaiveDate,
    pub messages_answered: u64,
    pub positive_rate: f64,
    pub scheduled_leads: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSummary {
    pub totals: EngagementCounts,
    pub positive_rate: f64,
    pub negative_rate: f64,
    pub relevance_rate: f64,
    pub scheduling_rate: f64,
    pub points: Vec<EngagementPoint>,
}
