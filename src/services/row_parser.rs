use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::models::funnel::{DataIssue, DataIssueKind, MetricsSnapshot, Stage, StageCount};
use crate::models::leads::{LeadRecord, LeadStage, LEAD_TRACKER_WORKSHEET};
use crate::models::series::{
    DailyRow, DailySeries, EngagementCounts, EngagementRow, EngagementSeries, DAILY_WORKSHEET,
    ENGAGEMENT_WORKSHEET,
};
use crate::services::metrics_engine::parse_count;
use crate::services::sheet_source::SheetRecord;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const COLUMN_STAGE: &str = "Stage";
const COLUMN_COUNT: &str = "Count";
const COLUMN_DATE: &str = "Date";
const COLUMN_BUDGET: &str = "Daily Budget";
const COLUMN_SOURCE: &str = "Source";

const ENGAGEMENT_COLUMNS: [&str; 6] = [
    "Messages Answered",
    "Positive",
    "Negative",
    "Relevant",
    "Irrelevant",
    "Scheduled Leads",
];

/// Parsed rows plus the problems found while parsing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub issues: Vec<DataIssue>,
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|value| value.date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT)
                .ok()
                .map(|value| value.date())
        })
}

/// Parses a currency cell such as `£1,250.50`. Blank cells yield `Ok(None)`.
pub fn parse_currency(raw: &str) -> Result<Option<f64>, &'static str> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, '£' | '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(Some(value)),
        Ok(_) => Err("amount must be a non-negative number"),
        Err(_) => Err("amount is not a number"),
    }
}

pub fn parse_stage_counts(records: &[SheetRecord]) -> Vec<StageCount> {
    records
        .iter()
        .map(|record| {
            StageCount::new(
                record.get(COLUMN_STAGE).unwrap_or_default(),
                record.get(COLUMN_COUNT).unwrap_or_default(),
            )
            .at_row(record.row)
        })
        .collect()
}

/// Daily rows: unparsable dates drop the row, malformed counts become 0.
pub fn parse_daily_series(records: &[SheetRecord]) -> Parsed<DailySeries> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let Some(date) = required_date(record, DAILY_WORKSHEET, &mut issues) else {
            continue;
        };
        flag_duplicate(&mut seen, date, record.row, DAILY_WORKSHEET, &mut issues);

        let mut counts = [0u64; 7];
        for (slot, stage) in counts.iter_mut().zip(Stage::ALL) {
            *slot = lenient_count(record, stage.label(), DAILY_WORKSHEET, &mut issues);
        }

        let daily_budget = match parse_currency(record.get(COLUMN_BUDGET).unwrap_or_default()) {
            Ok(amount) => amount,
            Err(reason) => {
                issues.push(DataIssue::new(
                    DAILY_WORKSHEET,
                    record.row,
                    Some(COLUMN_BUDGET),
                    DataIssueKind::MalformedValue,
                    format!(
                        "'{}': {}",
                        record.get(COLUMN_BUDGET).unwrap_or_default().trim(),
                        reason
                    ),
                ));
                None
            }
        };

        let source = record
            .get(COLUMN_SOURCE)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        rows.push(DailyRow {
            date,
            counts: MetricsSnapshot::from_counts(counts),
            daily_budget,
            source,
        });
    }

    log_issues(DAILY_WORKSHEET, &issues);
    Parsed {
        value: DailySeries::new(rows),
        issues,
    }
}

pub fn parse_engagement_series(records: &[SheetRecord]) -> Parsed<EngagementSeries> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let Some(date) = required_date(record, ENGAGEMENT_WORKSHEET, &mut issues) else {
            continue;
        };
        flag_duplicate(&mut seen, date, record.row, ENGAGEMENT_WORKSHEET, &mut issues);

        let mut values = [0u64; 6];
        for (slot, column) in values.iter_mut().zip(ENGAGEMENT_COLUMNS) {
            *slot = lenient_count(record, column, ENGAGEMENT_WORKSHEET, &mut issues);
        }

        rows.push(EngagementRow {
            date,
            counts: EngagementCounts {
                messages_answered: values[0],
                positive: values[1],
                negative: values[2],
                relevant: values[3],
                irrelevant: values[4],
                scheduled_leads: values[5],
            },
        });
    }

    log_issues(ENGAGEMENT_WORKSHEET, &issues);
    Parsed {
        value: EngagementSeries::new(rows),
        issues,
    }
}

/// Tracker rows with an unrecognised stage are kept as `Other`; bad dates are cleared.
pub fn parse_lead_records(records: &[SheetRecord]) -> Parsed<Vec<LeadRecord>> {
    let mut issues = Vec::new();
    let mut leads = Vec::with_capacity(records.len());

    for record in records {
        let raw_stage = record.get("Current Stage").unwrap_or_default();
        let stage = LeadStage::from_label(raw_stage).unwrap_or_else(|| {
            issues.push(DataIssue::new(
                LEAD_TRACKER_WORKSHEET,
                record.row,
                Some("Current Stage"),
                DataIssueKind::UnknownStage,
                format!("unknown lead stage '{}' counted as Other", raw_stage.trim()),
            ));
            LeadStage::Other
        });

        leads.push(LeadRecord {
            lead_id: text(record, "Lead ID"),
            first_name: text(record, "First Name"),
            last_name: text(record, "Last Name"),
            stage,
            source: text(record, "Lead Source"),
            agent: text(record, "Agent Assigned"),
            campaign: text(record, "Campaign Name"),
            date_collected: optional_date(record, "Date Collected", &mut issues),
            next_follow_up: optional_date(record, "Next Follow-up", &mut issues),
        });
    }

    log_issues(LEAD_TRACKER_WORKSHEET, &issues);
    Parsed {
        value: leads,
        issues,
    }
}

fn text(record: &SheetRecord, column: &str) -> String {
    record.get(column).unwrap_or_default().trim().to_string()
}

fn required_date(
    record: &SheetRecord,
    worksheet: &str,
    issues: &mut Vec<DataIssue>,
) -> Option<NaiveDate> {
    let raw = record.get(COLUMN_DATE).unwrap_or_default();
    let date = parse_date(raw);
    if date.is_none() {
        issues.push(DataIssue::new(
            worksheet,
            record.row,
            Some(COLUMN_DATE),
            DataIssueKind::DroppedRow,
            format!("unparsable date '{}'", raw.trim()),
        ));
    }
    date
}

fn optional_date(
    record: &SheetRecord,
    column: &str,
    issues: &mut Vec<DataIssue>,
) -> Option<NaiveDate> {
    let raw = record.get(column).unwrap_or_default();
    if raw.trim().is_empty() {
        return None;
    }
    let date = parse_date(raw);
    if date.is_none() {
        issues.push(DataIssue::new(
            LEAD_TRACKER_WORKSHEET,
            record.row,
            Some(column),
            DataIssueKind::MalformedValue,
            format!("unparsable date '{}'", raw.trim()),
        ));
    }
    date
}

fn lenient_count(
    record: &SheetRecord,
    column: &str,
    worksheet: &str,
    issues: &mut Vec<DataIssue>,
) -> u64 {
    let raw = record.get(column).unwrap_or_default();
    match parse_count(raw) {
        Ok(value) => value,
        Err(reason) => {
            issues.push(DataIssue::new(
                worksheet,
                record.row,
                Some(column),
                DataIssueKind::MalformedValue,
                format!("'{}' treated as 0: {}", raw.trim(), reason),
            ));
            0
        }
    }
}

fn flag_duplicate(
    seen: &mut HashSet<NaiveDate>,
    date: NaiveDate,
    row: usize,
    worksheet: &str,
    issues: &mut Vec<DataIssue>,
) {
    if !seen.insert(date) {
        issues.push(DataIssue::new(
            worksheet,
            row,
            Some(COLUMN_DATE),
            DataIssueKind::DuplicateDate,
            format!("date {date} repeated; later row wins"),
        ));
    }
}

fn log_issues(worksheet: &str, issues: &[DataIssue]) {
    if !issues.is_empty() {
        debug!(target: "app::sheets", %worksheet, issues = issues.len(), "rows flagged while parsing");
    }
}
