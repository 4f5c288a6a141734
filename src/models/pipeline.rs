use std::fmt;

use serde::{Deserialize, Serialize};

use super::funnel::Stage;

/// Campaign targets per stage. Stages without a target are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTargets {
    #[serde(default)]
    pub total_leads: Option<u64>,
    #[serde(default)]
    pub qualified_leads: Option<u64>,
    #[serde(default)]
    pub viewings_completed: Option<u64>,
    #[serde(default)]
    pub offers_made: Option<u64>,
    #[serde(default)]
    pub closed_sales: Option<u64>,
}

impl StageTargets {
    pub fn entries(&self) -> Vec<(Stage, u64)> {
        [
            (Stage::TotalLeads, self.total_leads),
            (Stage::QualifiedLeads, self.qualified_leads),
            (Stage::ViewingsCompleted, self.viewings_completed),
            (Stage::OffersMade, self.offers_made),
            (Stage::ClosedSales, self.closed_sales),
        ]
        .into_iter()
        .filter_map(|(stage, target)| target.map(|value| (stage, value)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetProgress {
    pub stage: Stage,
    pub actual: u64,
    pub target: u64,
    pub percent_complete: f64,
    pub remaining: u64,
    pub achieved: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Ok,
    Warning,
    Critical,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Ok => "ok",
            HealthLevel::Warning => "warning",
            HealthLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineHealth {
    /// Qualified leads that have not yet closed.
    pub active_pipeline: u64,
    pub viewing_show_rate: f64,
    pub offer_acceptance_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_rate: Option<f64>,
    pub level: HealthLevel,
}
