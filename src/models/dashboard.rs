use serde::{Deserialize, Serialize};

use super::funnel::{
    Bottleneck, DataIssue, FunnelRates, MetricsSnapshot, Projection, TemperatureBreakdown,
};
use super::leads::LeadTrackerView;
use super::pipeline::{PipelineHealth, StageTargets, TargetProgress};
use super::series::{EngagementSummary, PeriodComparison, SourcePerformance, TrendPoint};

pub const DEFAULT_PROJECTION_HORIZON: u64 = 100;
pub const DEFAULT_TREND_WINDOW_DAYS: u32 = 7;

/// Display toggles and targets passed into every dashboard fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    pub show_funnel_chart: bool,
    pub show_trends: bool,
    pub show_projections: bool,
    pub show_bottlenecks: bool,
    pub show_targets: bool,
    pub show_pipeline_health: bool,
    pub show_lead_temperature: bool,
    pub show_engagement: bool,
    pub show_lead_tracker: bool,
    pub show_ai_insights: bool,
    pub projection_horizon: u64,
    pub trend_window_days: u32,
    pub targets: StageTargets,
    /// Restricts the follow-up list to one agent when set.
    pub follow_up_agent: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            show_funnel_chart: true,
            show_trends: true,
            show_projections: true,
            show_bottlenecks: true,
            show_targets: true,
            show_pipeline_health: true,
            show_lead_temperature: true,
            show_engagement: true,
            show_lead_tracker: true,
            show_ai_insights: false,
            projection_horizon: DEFAULT_PROJECTION_HORIZON,
            trend_window_days: DEFAULT_TREND_WINDOW_DAYS,
            targets: StageTargets::default(),
            follow_up_agent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DashboardSection {
    Trends,
    Engagement,
    LeadTracker,
}

impl DashboardSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            DashboardSection::Trends => "trends",
            DashboardSection::Engagement => "engagement",
            DashboardSection::LeadTracker => "leadTracker",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Ready,
    Unavailable,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionNotice {
    pub section: DashboardSection,
    pub status: SectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum InsightSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightCard {
    pub id: String,
    pub headline: String,
    pub detail: String,
    pub severity: InsightSeverity,
    pub generated_at: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_leads: u64,
    pub qualified_leads: u64,
    pub closed_sales: u64,
    pub qualification_rate: f64,
    pub close_rate: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSection {
    /// Stage counts summed over every daily row.
    pub totals: MetricsSnapshot,
    pub points: Vec<TrendPoint>,
    pub sources: Vec<SourcePerformance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<PeriodComparison>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub source_identity: String,
    pub generated_at: String,
    pub fetched_at: String,
    pub from_cache: bool,
    pub summary: DashboardSummary,
    pub snapshot: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funnel: Option<FunnelRates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottlenecks: Option<Vec<Bottleneck>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<TemperatureBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<TargetProgress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_health: Option<PipelineHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<TrendSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement: Option<EngagementSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_tracker: Option<LeadTrackerView>,
    #[serde(default)]
    pub sections: Vec<SectionNotice>,
    #[serde(default)]
    pub issues: Vec<DataIssue>,
    #[serde(default)]
    pub insights: Vec<InsightCard>,
}

impl DashboardResponse {
    pub fn section(&self, section: DashboardSection) -> Option<&SectionNotice> {
        self.sections.iter().find(|notice| notice.section == section)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

impl Default for ReportFormat {
    fn default() -> Self {
        ReportFormat::Markdown
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportExportParams {
    #[serde(default)]
    pub format: ReportFormat,
    #[serde(default)]
    pub config: Option<DashboardConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportExportResult {
    pub file_path: String,
    pub format: ReportFormat,
    pub generated_at: String,
}
