use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::dashboard::{
    DashboardConfig, DashboardResponse, DashboardSection, DashboardSummary, InsightCard,
    InsightSeverity, ReportExportResult, ReportFormat, SectionNotice, SectionStatus, TrendSection,
};
use crate::models::funnel::{
    Bottleneck, DataIssue, StageCount, TemperatureBreakdown, METRICS_WORKSHEET,
};
use crate::models::leads::{LeadRecord, LEAD_TRACKER_WORKSHEET};
use crate::models::pipeline::{HealthLevel, PipelineHealth};
use crate::models::series::{
    DailySeries, EngagementSeries, PeriodComparison, DAILY_WORKSHEET, ENGAGEMENT_WORKSHEET,
};
use crate::services::engagement_engine::engagement_summary;
use crate::services::lead_tracker_engine::tracker_view;
use crate::services::metrics_engine::{
    bottlenecks, compute_snapshot_with_issues, funnel_rates, lead_temperature, percentage,
    projections,
};
use crate::services::pipeline_engine::{pipeline_health, target_progress};
use crate::services::row_parser::{
    parse_daily_series, parse_engagement_series, parse_lead_records, parse_stage_counts, Parsed,
};
use crate::services::series_engine::{
    daily_trends, period_comparison, series_snapshot, source_breakdown,
};
use crate::services::settings_service::DEFAULT_CACHE_TTL_SECS;
use crate::services::sheet_source::{RowSource, SheetRecord};

const REPORT_PREFIX: &str = "funnel-report";
const CLOSE_RATE_HEALTHY: f64 = 5.0;
const CLOSE_RATE_WARNING: f64 = 2.0;
const QUALITY_HEALTHY: f64 = 2.0;
const QUALITY_WARNING: f64 = 1.5;

/// An optional worksheet either parsed, or the reason it could not be read.
type OptionalTable<T> = Result<Parsed<T>, String>;

/// Everything read from one source in a single refresh.
#[derive(Debug, Clone)]
struct SourceData {
    stage_counts: Vec<StageCount>,
    daily: OptionalTable<DailySeries>,
    engagement: OptionalTable<EngagementSeries>,
    leads: OptionalTable<Vec<LeadRecord>>,
    fetched_at: DateTime<Utc>,
}

#[derive(Clone)]
struct CachedFetch {
    data: Arc<SourceData>,
    cached_at: DateTime<Utc>,
}

/// Fetches worksheets from the configured source, memoizes them for a short
/// TTL and assembles the dashboard from the engines.
pub struct DashboardService {
    source: RwLock<Option<Arc<dyn RowSource>>>,
    cache: RwLock<HashMap<String, CachedFetch>>,
    cache_ttl: RwLock<Duration>,
    reports_dir: PathBuf,
}

impl DashboardService {
    pub fn new(reports_dir: PathBuf) -> AppResult<Self> {
        std::fs::create_dir_all(&reports_dir)?;
        Ok(Self {
            source: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
            cache_ttl: RwLock::new(Duration::seconds(DEFAULT_CACHE_TTL_SECS as i64)),
            reports_dir,
        })
    }

    pub fn with_source(self, source: Arc<dyn RowSource>) -> Self {
        if let Ok(mut guard) = self.source.write() {
            *guard = Some(source);
        }
        self
    }

    pub fn with_cache_ttl(self, seconds: u64) -> Self {
        self.set_cache_ttl(seconds);
        self
    }

    /// Swaps the row source. Data cached for the previous source is dropped.
    pub fn set_source(&self, source: Option<Arc<dyn RowSource>>) -> AppResult<()> {
        let previous = {
            let mut guard = self
                .source
                .write()
                .map_err(|_| AppError::other("dashboard source lock poisoned"))?;
            std::mem::replace(&mut *guard, source)
        };

        if let Some(previous) = previous {
            self.invalidate(&previous.identity());
        }
        info!(target: "app::dashboard", source = ?self.source_identity(), "dashboard source replaced");
        Ok(())
    }

    pub fn set_cache_ttl(&self, seconds: u64) {
        if let Ok(mut guard) = self.cache_ttl.write() {
            *guard = Duration::seconds(seconds as i64);
        }
    }

    pub fn source_identity(&self) -> Option<String> {
        self.source
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|source| source.identity()))
    }

    pub async fn fetch(&self, config: &DashboardConfig) -> AppResult<DashboardResponse> {
        let source = self.current_source()?;
        let identity = source.identity();

        let (data, from_cache) = match self.try_get_cache(&identity) {
            Some(cached) => {
                debug!(target: "app::dashboard", %identity, "dashboard cache hit");
                (cached, true)
            }
            None => {
                let data = Arc::new(load_source_data(source.as_ref()).await?);
                self.insert_cache(identity.clone(), Arc::clone(&data));
                (data, false)
            }
        };

        let today = Utc::now().date_naive();
        Ok(assemble_dashboard(identity, &data, config, from_cache, today))
    }

    /// Drops cached rows for the current source and fetches again.
    pub async fn refresh(&self, config: &DashboardConfig) -> AppResult<DashboardResponse> {
        if let Some(identity) = self.source_identity() {
            self.invalidate(&identity);
        }
        self.fetch(config).await
    }

    pub fn invalidate(&self, identity: &str) -> bool {
        self.cache
            .write()
            .map(|mut guard| guard.remove(identity).is_some())
            .unwrap_or(false)
    }

    /// Empties the fetch cache, returning how many sources were dropped.
    pub fn clear_cache(&self) -> usize {
        self.cache
            .write()
            .map(|mut guard| {
                let cleared = guard.len();
                guard.clear();
                cleared
            })
            .unwrap_or(0)
    }

    pub async fn export_report(
        &self,
        config: &DashboardConfig,
        format: ReportFormat,
    ) -> AppResult<ReportExportResult> {
        let response = self.fetch(config).await?;
        self.generate_report_file(&response, format)
    }

    fn current_source(&self) -> AppResult<Arc<dyn RowSource>> {
        let guard = self
            .source
            .read()
            .map_err(|_| AppError::other("dashboard source lock poisoned"))?;
        guard.as_ref().cloned().ok_or_else(|| {
            AppError::validation("no spreadsheet configured; set the source locator first")
        })
    }

    fn try_get_cache(&self, identity: &str) -> Option<Arc<SourceData>> {
        let now = Utc::now();
        let ttl = self
            .cache_ttl
            .read()
            .map(|guard| *guard)
            .unwrap_or_else(|_| Duration::zero());
        self.cache
            .read()
            .ok()
            .and_then(|guard| guard.get(identity).cloned())
            .and_then(|entry| {
                if now - entry.cached_at < ttl {
                    Some(entry.data)
                } else {
                    None
                }
            })
    }

    fn insert_cache(&self, identity: String, data: Arc<SourceData>) {
        if let Ok(mut guard) = self.cache.write() {
            guard.insert(
                identity,
                CachedFetch {
                    data,
                    cached_at: Utc::now(),
                },
            );
        }
    }

    fn generate_report_file(
        &self,
        response: &DashboardResponse,
        format: ReportFormat,
    ) -> AppResult<ReportExportResult> {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let filename = format!("{REPORT_PREFIX}-{timestamp}.{}", format.file_extension());
        let path = self.reports_dir.join(filename);

        match format {
            ReportFormat::Markdown => {
                std::fs::write(&path, render_markdown_report(response))?;
            }
            ReportFormat::Json => {
                std::fs::write(&path, serde_json::to_string_pretty(response)?)?;
            }
        }

        info!(target: "app::dashboard", path = %path.display(), "dashboard report exported");
        Ok(ReportExportResult {
            file_path: path.to_string_lossy().to_string(),
            format,
            generated_at: Utc::now().to_rfc3339(),
        })
    }
}

async fn load_source_data(source: &dyn RowSource) -> AppResult<SourceData> {
    let metrics = source.fetch_worksheet(METRICS_WORKSHEET).await?;
    let stage_counts = parse_stage_counts(&metrics);

    let daily = optional_worksheet(source, DAILY_WORKSHEET)
        .await
        .map(|records| parse_daily_series(&records));
    let engagement = optional_worksheet(source, ENGAGEMENT_WORKSHEET)
        .await
        .map(|records| parse_engagement_series(&records));
    let leads = optional_worksheet(source, LEAD_TRACKER_WORKSHEET)
        .await
        .map(|records| parse_lead_records(&records));

    debug!(
        target: "app::dashboard",
        identity = %source.identity(),
        metrics_rows = stage_counts.len(),
        "source worksheets loaded"
    );

    Ok(SourceData {
        stage_counts,
        daily,
        engagement,
        leads,
        fetched_at: Utc::now(),
    })
}

async fn optional_worksheet(
    source: &dyn RowSource,
    worksheet: &str,
) -> Result<Vec<SheetRecord>, String> {
    source.fetch_worksheet(worksheet).await.map_err(|error| {
        if error.is_missing_worksheet() {
            info!(target: "app::dashboard", %worksheet, "optional worksheet absent");
        } else {
            warn!(target: "app::dashboard", %worksheet, error = %error, "optional worksheet unavailable");
        }
        error.to_string()
    })
}

fn assemble_dashboard(
    source_identity: String,
    data: &SourceData,
    config: &DashboardConfig,
    from_cache: bool,
    today: NaiveDate,
) -> DashboardResponse {
    let (snapshot, mut issues) = compute_snapshot_with_issues(&data.stage_counts);
    let rates = funnel_rates(&snapshot);
    let ranked = bottlenecks(&snapshot);
    let temperature = lead_temperature(&snapshot);
    let health = pipeline_health(&snapshot);

    let summary = DashboardSummary {
        total_leads: snapshot.total_leads(),
        qualified_leads: snapshot.qualified_leads(),
        closed_sales: snapshot.closed_sales(),
        qualification_rate: percentage(snapshot.qualified_leads(), snapshot.total_leads()),
        close_rate: rates.overall_close_rate,
        quality_score: temperature.quality_score,
    };

    let mut sections = Vec::new();

    let trends = optional_section(
        DashboardSection::Trends,
        config.show_trends,
        &data.daily,
        &mut sections,
        &mut issues,
    )
    .map(|series| TrendSection {
        totals: series_snapshot(series),
        points: daily_trends(series),
        sources: source_breakdown(series),
        comparison: period_comparison(series, config.trend_window_days),
    });

    let engagement = optional_section(
        DashboardSection::Engagement,
        config.show_engagement,
        &data.engagement,
        &mut sections,
        &mut issues,
    )
    .map(engagement_summary);

    let lead_tracker = optional_section(
        DashboardSection::LeadTracker,
        config.show_lead_tracker,
        &data.leads,
        &mut sections,
        &mut issues,
    )
    .map(|leads| tracker_view(leads, config.follow_up_agent.as_deref(), today));

    let comparison = trends.as_ref().and_then(|section| section.comparison.as_ref());
    let insights = build_insights(&summary, ranked.first(), &health, &temperature, comparison);

    DashboardResponse {
        source_identity,
        generated_at: Utc::now().to_rfc3339(),
        fetched_at: data.fetched_at.to_rfc3339(),
        from_cache,
        summary,
        snapshot,
        funnel: config.show_funnel_chart.then_some(rates),
        projection: config
            .show_projections
            .then(|| projections(&snapshot, config.projection_horizon)),
        bottlenecks: config.show_bottlenecks.then_some(ranked),
        temperature: config.show_lead_temperature.then_some(temperature),
        targets: (config.show_targets && !config.targets.is_empty())
            .then(|| target_progress(&snapshot, &config.targets)),
        pipeline_health: config.show_pipeline_health.then_some(health),
        trends,
        engagement,
        lead_tracker,
        sections,
        issues,
        insights,
    }
}

/// Records the section notice and hands back the parsed table when the
/// section is enabled and its worksheet could be read.
fn optional_section<'a, T>(
    section: DashboardSection,
    enabled: bool,
    table: &'a OptionalTable<T>,
    sections: &mut Vec<SectionNotice>,
    issues: &mut Vec<DataIssue>,
) -> Option<&'a T> {
    if !enabled {
        sections.push(SectionNotice {
            section,
            status: SectionStatus::Disabled,
            message: None,
        });
        return None;
    }

    match table {
        Ok(parsed) => {
            issues.extend(parsed.issues.iter().cloned());
            sections.push(SectionNotice {
                section,
                status: SectionStatus::Ready,
                message: None,
            });
            Some(&parsed.value)
        }
        Err(reason) => {
            sections.push(SectionNotice {
                section,
                status: SectionStatus::Unavailable,
                message: Some(reason.clone()),
            });
            None
        }
    }
}

fn build_insights(
    summary: &DashboardSummary,
    critical: Option<&Bottleneck>,
    health: &PipelineHealth,
    temperature: &TemperatureBreakdown,
    comparison: Option<&PeriodComparison>,
) -> Vec<InsightCard> {
    let generated_at = Utc::now().to_rfc3339();
    let card = |id: &str, headline: String, detail: String, severity: InsightSeverity| InsightCard {
        id: id.to_string(),
        headline,
        detail,
        severity,
        generated_at: generated_at.clone(),
        source: "rule".to_string(),
    };

    let mut cards = Vec::with_capacity(4);

    if let Some(bottleneck) = critical {
        let severity = match health.level {
            HealthLevel::Critical => InsightSeverity::Critical,
            HealthLevel::Warning => InsightSeverity::Warning,
            HealthLevel::Ok => InsightSeverity::Info,
        };
        cards.push(card(
            "insight-critical-bottleneck",
            format!("Biggest drop-off: {}", bottleneck.label),
            format!(
                "Only {:.1}% of {} reach {}; {} leads are lost at this step.",
                bottleneck.rate,
                bottleneck.from_stage.label().to_lowercase(),
                bottleneck.to_stage.label().to_lowercase(),
                bottleneck.drop_off
            ),
            severity,
        ));
    }

    let close_severity = if summary.close_rate >= CLOSE_RATE_HEALTHY {
        InsightSeverity::Info
    } else if summary.close_rate >= CLOSE_RATE_WARNING {
        InsightSeverity::Warning
    } else {
        InsightSeverity::Critical
    };
    cards.push(card(
        "insight-close-rate",
        "Overall close rate".to_string(),
        format!(
            "{} of {} leads closed ({:.1}%).",
            summary.closed_sales, summary.total_leads, summary.close_rate
        ),
        close_severity,
    ));

    let quality_severity = if temperature.quality_score >= QUALITY_HEALTHY {
        InsightSeverity::Info
    } else if temperature.quality_score >= QUALITY_WARNING {
        InsightSeverity::Warning
    } else {
        InsightSeverity::Critical
    };
    cards.push(card(
        "insight-lead-quality",
        format!("Lead quality score {:.2} / 3", temperature.quality_score),
        format!(
            "{} hot, {} warm and {} cold leads ({:.1}% hot).",
            temperature.hot, temperature.warm, temperature.cold, temperature.hot_pct
        ),
        quality_severity,
    ));

    if let Some(comparison) = comparison {
        let (headline, severity) = match comparison.lead_growth {
            Some(growth) if growth < 0.0 => (
                format!("Lead volume down {:.1}%", growth.abs()),
                InsightSeverity::Warning,
            ),
            Some(growth) => (format!("Lead volume up {growth:.1}%"), InsightSeverity::Info),
            None => ("No earlier period to compare".to_string(), InsightSeverity::Info),
        };
        cards.push(card(
            "insight-period-trend",
            headline,
            format!(
                "{} leads and {} closed in the last {} days against {} leads and {} closed before.",
                comparison.current_leads,
                comparison.current_closed,
                comparison.window_days,
                comparison.previous_leads,
                comparison.previous_closed
            ),
            severity,
        ));
    }

    cards
}

pub fn render_markdown_report(response: &DashboardResponse) -> String {
    let summary = &response.summary;
    let mut content = String::new();
    content.push_str("# Sales Funnel Report\n\n");
    content.push_str(&format!("Generated: {}\n\n", response.generated_at));
    content.push_str(&format!("Source: {}\n\n", response.source_identity));

    content.push_str("## Summary\n");
    content.push_str(&format!(
        "- Total leads: {}\n- Qualified leads: {} ({:.1}%)\n- Closed sales: {} ({:.1}%)\n- Lead quality score: {:.2}\n\n",
        summary.total_leads,
        summary.qualified_leads,
        summary.qualification_rate,
        summary.closed_sales,
        summary.close_rate,
        summary.quality_score
    ));

    content.push_str("## Funnel\n");
    for (stage, count) in response.snapshot.iter() {
        content.push_str(&format!("- {}: {}\n", stage.label(), count));
    }
    content.push('\n');

    if let Some(ranked) = &response.bottlenecks {
        content.push_str("## Bottlenecks\n");
        for bottleneck in ranked {
            content.push_str(&format!(
                "- {}: {:.1}% ({} lost)\n",
                bottleneck.label, bottleneck.rate, bottleneck.drop_off
            ));
        }
        content.push('\n');
    }

    if let Some(projection) = &response.projection {
        content.push_str(&format!("## Projection per {} leads\n", projection.horizon));
        content.push_str(&format!(
            "- Expected closed sales: {}\n- With 10% better qualification: {} ({:+})\n- With 10% better viewing completion: {} ({:+})\n\n",
            projection.baseline_closed,
            projection.improved_qualification.projected_closed,
            projection.improved_qualification.delta,
            projection.improved_viewing.projected_closed,
            projection.improved_viewing.delta
        ));
    }

    if let Some(targets) = &response.targets {
        content.push_str("## Targets\n");
        for target in targets {
            content.push_str(&format!(
                "- {}: {} / {} ({:.1}%)\n",
                target.stage.label(),
                target.actual,
                target.target,
                target.percent_complete
            ));
        }
        content.push('\n');
    }

    if let Some(health) = &response.pipeline_health {
        content.push_str("## Pipeline Health\n");
        content.push_str(&format!(
            "- Status: {}\n- Active pipeline: {}\n- Viewing show rate: {:.1}%\n- Offer acceptance: {:.1}%\n\n",
            health.level, health.active_pipeline, health.viewing_show_rate, health.offer_acceptance_rate
        ));
    }

    if let Some(trends) = &response.trends {
        if let Some(comparison) = &trends.comparison {
            content.push_str("## Trend\n");
            content.push_str(&format!(
                "- Last {} days: {} leads, {} closed\n- Previous period: {} leads, {} closed\n\n",
                comparison.window_days,
                comparison.current_leads,
                comparison.current_closed,
                comparison.previous_leads,
                comparison.previous_closed
            ));
        }
    }

    content.push_str("## Insights\n");
    for insight in &response.insights {
        content.push_str(&format!("- **{}**: {}\n", insight.headline, insight.detail));
    }

    let unavailable: Vec<&SectionNotice> = response
        .sections
        .iter()
        .filter(|notice| notice.status == SectionStatus::Unavailable)
        .collect();
    if !unavailable.is_empty() {
        content.push_str("\n## Unavailable Sections\n");
        for notice in unavailable {
            content.push_str(&format!(
                "- {}: {}\n",
                notice.section.as_str(),
                notice.message.as_deref().unwrap_or("unavailable")
            ));
        }
    }

    if !response.issues.is_empty() {
        content.push_str(&format!(
            "\n{} data issue(s) were flagged while reading the sheet.\n",
            response.issues.len()
        ));
    }

    content
}
