use std::fmt;

use serde::{Deserialize, Serialize};

pub const METRICS_WORKSHEET: &str = "Metrics";

/// Canonical funnel stages, in funnel order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    #[serde(rename = "Total Leads")]
    TotalLeads,
    #[serde(rename = "Qualified Leads")]
    QualifiedLeads,
    #[serde(rename = "Viewings Scheduled")]
    ViewingsScheduled,
    #[serde(rename = "Viewings Completed")]
    ViewingsCompleted,
    #[serde(rename = "Offers Made")]
    OffersMade,
    #[serde(rename = "Offers Accepted")]
    OffersAccepted,
    #[serde(rename = "Closed Sales")]
    ClosedSales,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::TotalLeads,
        Stage::QualifiedLeads,
        Stage::ViewingsScheduled,
        Stage::ViewingsCompleted,
        Stage::OffersMade,
        Stage::OffersAccepted,
        Stage::ClosedSales,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::TotalLeads => "Total Leads",
            Stage::QualifiedLeads => "Qualified Leads",
            Stage::ViewingsScheduled => "Viewings Scheduled",
            Stage::ViewingsCompleted => "Viewings Completed",
            Stage::OffersMade => "Offers Made",
            Stage::OffersAccepted => "Offers Accepted",
            Stage::ClosedSales => "Closed Sales",
        }
    }

    /// Matches a sheet label, ignoring surrounding whitespace and case.
    pub fn from_label(label: &str) -> Option<Stage> {
        let trimmed = label.trim();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.label().eq_ignore_ascii_case(trimmed))
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One raw `Stage`/`Count` row as read from the Metrics worksheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCount {
    pub stage: String,
    pub count: String,
    /// 1-based sheet row, header included.
    #[serde(default)]
    pub row: usize,
}

impl StageCount {
    pub fn new(stage: impl Into<String>, count: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            count: count.into(),
            row: 0,
        }
    }

    pub fn at_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }
}

/// Stage counts covering the whole canonical stage set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    total_leads: u64,
    qualified_leads: u64,
    viewings_scheduled: u64,
    viewings_completed: u64,
    offers_made: u64,
    offers_accepted: u64,
    closed_sales: u64,
}

impl MetricsSnapshot {
    /// Builds a snapshot from counts given in canonical stage order.
    pub fn from_counts(counts: [u64; 7]) -> Self {
        Self {
            total_leads: counts[0],
            qualified_leads: counts[1],
            viewings_scheduled: counts[2],
            viewings_completed: counts[3],
            offers_made: counts[4],
            offers_accepted: counts[5],
            closed_sales: counts[6],
        }
    }

    pub fn get(&self, stage: Stage) -> u64 {
        self.counts()[stage.index()]
    }

    pub fn counts(&self) -> [u64; 7] {
        [
            self.total_leads,
            self.qualified_leads,
            self.viewings_scheduled,
            self.viewings_completed,
            self.offers_made,
            self.offers_accepted,
            self.closed_sales,
        ]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, u64)> + '_ {
        Stage::ALL.into_iter().map(move |stage| (stage, self.get(stage)))
    }

    pub fn total_leads(&self) -> u64 {
        self.total_leads
    }

    pub fn qualified_leads(&self) -> u64 {
        self.qualified_leads
    }

    pub fn viewings_scheduled(&self) -> u64 {
        self.viewings_scheduled
    }

    pub fn viewings_completed(&self) -> u64 {
        self.viewings_completed
    }

    pub fn offers_made(&self) -> u64 {
        self.offers_made
    }

    pub fn offers_accepted(&self) -> u64 {
        self.offers_accepted
    }

    pub fn closed_sales(&self) -> u64 {
        self.closed_sales
    }

    /// Adds another snapshot stage by stage, saturating on overflow.
    pub fn combined(&self, other: &MetricsSnapshot) -> MetricsSnapshot {
        let left = self.counts();
        let right = other.counts();
        let mut merged = [0u64; 7];
        for (index, slot) in merged.iter_mut().enumerate() {
            *slot = left[index].saturating_add(right[index]);
        }
        MetricsSnapshot::from_counts(merged)
    }

    pub(crate) fn with_stage(self, stage: Stage, count: u64) -> MetricsSnapshot {
        let mut counts = self.counts();
        counts[stage.index()] = count;
        MetricsSnapshot::from_counts(counts)
    }
}

/// Conversion between two adjacent canonical stages.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub rate: f64,
}

/// Share of total leads that reached a stage.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageRate {
    pub stage: Stage,
    pub count: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunnelRates {
    pub transitions: Vec<StageTransition>,
    pub lead_rates: Vec<StageRate>,
    pub overall_close_rate: f64,
}

impl FunnelRates {
    pub fn transition(&self, from: Stage, to: Stage) -> Option<&StageTransition> {
        self.transitions
            .iter()
            .find(|transition| transition.from == from && transition.to == to)
    }

    pub fn lead_rate(&self, stage: Stage) -> f64 {
        self.lead_rates
            .iter()
            .find(|entry| entry.stage == stage)
            .map(|entry| entry.rate)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bottleneck {
    pub label: String,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub rate: f64,
    pub drop_off: u64,
    pub from_count: u64,
    pub to_count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedStage {
    pub stage: Stage,
    /// Rate relative to total leads, as a fraction.
    pub rate: f64,
    pub projected: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfScenario {
    pub improved_stage: Stage,
    pub current_rate: f64,
    pub improved_rate: f64,
    pub projected_closed: u64,
    pub delta: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub horizon: u64,
    pub stages: Vec<ProjectedStage>,
    pub baseline_closed: u64,
    pub improved_qualification: WhatIfScenario,
    pub improved_viewing: WhatIfScenario,
}

impl Projection {
    pub fn projected(&self, stage: Stage) -> u64 {
        self.stages
            .iter()
            .find(|entry| entry.stage == stage)
            .map(|entry| entry.projected)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureBreakdown {
    pub hot: u64,
    pub warm: u64,
    pub cold: u64,
    pub hot_pct: f64,
    pub warm_pct: f64,
    pub cold_pct: f64,
    pub hot_to_close_rate: f64,
    pub warm_to_hot_rate: f64,
    pub cold_to_warm_rate: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataIssueKind {
    MalformedValue,
    UnknownStage,
    DuplicateStage,
    DuplicateDate,
    DroppedRow,
}

/// A problem found while turning sheet rows into typed values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataIssue {
    pub worksheet: String,
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub kind: DataIssueKind,
    pub message: String,
}

impl DataIssue {
    pub fn new(
        worksheet: impl Into<String>,
        row: usize,
        column: Option<&str>,
        kind: DataIssueKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            worksheet: worksheet.into(),
            row,
            column: column.map(str::to_string),
            kind,
            message: message.into(),
        }
    }
}
