use std::sync::Arc;

use funnel_dashboard_lib::commands::dashboard::{dashboard_fetch_impl, dashboard_report_export_impl};
use funnel_dashboard_lib::commands::AppState;
use funnel_dashboard_lib::models::dashboard::{
    DashboardConfig, DashboardSection, ReportExportParams, ReportFormat, SectionStatus,
};
use funnel_dashboard_lib::models::funnel::{DataIssueKind, MetricsSnapshot, Stage, METRICS_WORKSHEET};
use funnel_dashboard_lib::models::leads::{LeadStage, LEAD_TRACKER_WORKSHEET};
use funnel_dashboard_lib::models::pipeline::StageTargets;
use funnel_dashboard_lib::models::series::{DAILY_WORKSHEET, ENGAGEMENT_WORKSHEET};
use funnel_dashboard_lib::services::ai_service::AiService;
use funnel_dashboard_lib::services::dashboard_service::DashboardService;
use funnel_dashboard_lib::services::metrics_engine::{
    bottlenecks, compute_snapshot, funnel_rates, lead_temperature, projections,
};
use funnel_dashboard_lib::services::settings_service::{AiConfig, AppConfig, SettingsService};
use funnel_dashboard_lib::services::sheet_source::InMemorySource;
use tempfile::tempdir;

fn sample_snapshot() -> MetricsSnapshot {
    MetricsSnapshot::from_counts([150, 45, 30, 25, 15, 10, 8])
}

fn campaign_source() -> InMemorySource {
    InMemorySource::new("campaign")
        .with_table(
            METRICS_WORKSHEET,
            &["Stage", "Count"],
            &[
                &["Total Leads", "150"],
                &["Qualified Leads", "45"],
                &["Viewings Scheduled", "30"],
                &["Viewings Completed", "25"],
                &["Offers Made", "15"],
                &["Offers Accepted", "10"],
                &["Closed Sales", "8"],
                &["Brochures Sent", "70"],
            ],
        )
        .with_table(
            DAILY_WORKSHEET,
            &["Date", "Total Leads", "Qualified Leads", "Closed Sales", "Daily Budget", "Source"],
            &[
                &["2024-05-27", "8", "2", "0", "£120", "Facebook"],
                &["2024-05-28", "9", "3", "1", "£120", "Facebook"],
                &["2024-06-03", "12", "4", "1", "£150", "Google"],
                &["2024-06-04", "14", "5", "1", "£150", "Facebook"],
                &["not a date", "3", "1", "0", "", ""],
            ],
        )
        .with_table(
            ENGAGEMENT_WORKSHEET,
            &["Date", "Messages Answered", "Positive", "Negative", "Relevant", "Irrelevant", "Scheduled Leads"],
            &[
                &["2024-06-03", "40", "24", "6", "30", "10", "6"],
                &["2024-06-04", "60", "36", "9", "45", "15", "9"],
            ],
        )
        .with_table(
            LEAD_TRACKER_WORKSHEET,
            &[
                "Lead ID",
                "First Name",
                "Last Name",
                "Current Stage",
                "Lead Source",
                "Agent Assigned",
                "Campaign Name",
                "Date Collected",
                "Next Follow-up",
            ],
            &[
                &["L1", "Ana", "Reyes", "Contract Signed", "Facebook", "Alex", "Spring", "2024-05-01", ""],
                &["L2", "Ben", "Cole", "Negotiation", "Google", "Sam", "Spring", "2024-05-02", "2000-01-01"],
                &["L3", "Cy", "Dunn", "Lost", "Google", "Sam", "Open House", "2024-05-03", ""],
                &["L4", "Di", "Eve", "Mystery Stage", "Referral", "Alex", "", "", ""],
            ],
        )
}

fn app_state(dir: &std::path::Path) -> AppState {
    let dashboard = DashboardService::new(dir.join("reports"))
        .expect("dashboard service")
        .with_source(Arc::new(campaign_source()));
    AppState::from_parts(
        Arc::new(SettingsService::new(AppConfig::default())),
        Arc::new(dashboard),
        Arc::new(AiService::new(AiConfig::default()).expect("ai service")),
    )
}

#[test]
fn sample_funnel_matches_hand_computed_figures() {
    let snapshot = sample_snapshot();

    let rates = funnel_rates(&snapshot);
    assert!((rates.transitions[0].rate - 30.0).abs() < 1e-9);
    assert!((rates.overall_close_rate - 5.333).abs() < 0.001);

    let ranked: Vec<(String, f64)> = bottlenecks(&snapshot)
        .into_iter()
        .map(|entry| (entry.label, (entry.rate * 100.0).round() / 100.0))
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("Lead → Qualified".to_string(), 30.0),
            ("Qualified → Viewing".to_string(), 55.56),
            ("Viewing → Offer".to_string(), 60.0),
            ("Offer → Accepted".to_string(), 66.67),
            ("Accepted → Closed".to_string(), 80.0),
        ]
    );

    let projection = projections(&snapshot, 100);
    assert_eq!(projection.projected(Stage::QualifiedLeads), 30);
    assert_eq!(projection.projected(Stage::ClosedSales), 5);
    assert_eq!(projection.baseline_closed, 5);
}

#[test]
fn empty_funnel_yields_zeroes_everywhere() {
    let snapshot = compute_snapshot(&[]).expect("empty snapshot");
    assert_eq!(snapshot, MetricsSnapshot::default());

    let rates = funnel_rates(&snapshot);
    assert!(rates.transitions.iter().all(|transition| transition.rate == 0.0));
    assert_eq!(rates.overall_close_rate, 0.0);
    assert!(bottlenecks(&snapshot).is_empty());

    let projection = projections(&snapshot, 100);
    assert_eq!(projection.baseline_closed, 0);
    assert_eq!(projection.improved_viewing.projected_closed, 0);

    let temperature = lead_temperature(&snapshot);
    assert_eq!(temperature.hot + temperature.warm + temperature.cold, 0);
    assert_eq!(temperature.quality_score, 0.0);
}

#[test]
fn monotonic_funnels_keep_rates_bounded_and_tiers_exhaustive() {
    let fixtures = [
        [150, 45, 30, 25, 15, 10, 8],
        [1000, 900, 800, 700, 600, 500, 400],
        [10, 10, 10, 10, 10, 10, 10],
        [5, 0, 0, 0, 0, 0, 0],
        [3, 3, 2, 2, 1, 1, 0],
    ];

    for counts in fixtures {
        let snapshot = MetricsSnapshot::from_counts(counts);
        let rates = funnel_rates(&snapshot);
        let lead_rates: Vec<f64> = rates.lead_rates.iter().map(|entry| entry.rate).collect();
        assert!(
            lead_rates.windows(2).all(|pair| pair[0] >= pair[1]),
            "lead rates increase for {counts:?}"
        );

        let ranked = bottlenecks(&snapshot);
        assert!(ranked.windows(2).all(|pair| pair[0].rate <= pair[1].rate));
        assert!(ranked.iter().all(|entry| entry.from_count > 0));

        let temperature = lead_temperature(&snapshot);
        assert_eq!(
            temperature.hot + temperature.warm + temperature.cold,
            snapshot.total_leads()
        );
        assert!((0.0..=3.0).contains(&temperature.quality_score));

        assert_eq!(funnel_rates(&snapshot), rates);
        assert_eq!(bottlenecks(&snapshot), ranked);
        assert_eq!(lead_temperature(&snapshot), temperature);
    }
}

#[tokio::test]
async fn dashboard_flow_assembles_every_section() {
    let dir = tempdir().expect("temp dir");
    let state = app_state(dir.path());

    let config = DashboardConfig {
        targets: StageTargets {
            total_leads: Some(200),
            closed_sales: Some(10),
            ..StageTargets::default()
        },
        ..DashboardConfig::default()
    };
    let response = dashboard_fetch_impl(&state, Some(config), false)
        .await
        .expect("dashboard");

    assert_eq!(response.summary.total_leads, 150);
    assert_eq!(response.snapshot, sample_snapshot());
    assert!(response
        .issues
        .iter()
        .any(|issue| issue.message.contains("Brochures Sent")));
    assert!(response
        .issues
        .iter()
        .any(|issue| issue.worksheet == DAILY_WORKSHEET && issue.row == 6));

    let trends = response.trends.as_ref().expect("trends");
    assert_eq!(trends.points.len(), 4);
    let comparison = trends.comparison.as_ref().expect("comparison");
    assert_eq!(comparison.current_leads, 26);
    assert_eq!(comparison.previous_leads, 17);
    assert_eq!(trends.sources[0].source, "Facebook");

    let engagement = response.engagement.as_ref().expect("engagement");
    assert_eq!(engagement.totals.messages_answered, 100);
    assert!((engagement.positive_rate - 60.0).abs() < 1e-9);

    let tracker = response.lead_tracker.as_ref().expect("lead tracker");
    assert_eq!(tracker.summary.total, 4);
    assert_eq!(tracker.summary.won, 1);
    assert_eq!(tracker.summary.lost, 1);
    assert_eq!(tracker.summary.active, 2);
    assert_eq!(tracker.summary.win_rate, 25.0);
    assert_eq!(
        tracker.stages.last().map(|share| (share.stage, share.count)),
        Some((LeadStage::Other, 1))
    );
    assert!(response.issues.iter().any(|issue| {
        issue.worksheet == LEAD_TRACKER_WORKSHEET
            && issue.kind == DataIssueKind::UnknownStage
            && issue.message.contains("Mystery Stage")
    }));
    assert_eq!(tracker.follow_ups.len(), 1);
    assert_eq!(tracker.follow_ups[0].stage, LeadStage::Negotiation);
    assert!(tracker.follow_ups[0].overdue);

    let targets = response.targets.as_ref().expect("targets");
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[1].remaining, 2);

    for section in [
        DashboardSection::Trends,
        DashboardSection::Engagement,
        DashboardSection::LeadTracker,
    ] {
        assert_eq!(
            response.section(section).map(|notice| notice.status),
            Some(SectionStatus::Ready)
        );
    }
    assert!(response
        .insights
        .iter()
        .any(|card| card.id == "insight-period-trend" && card.headline.contains("up")));
}

#[tokio::test]
async fn report_export_writes_into_reports_dir() {
    let dir = tempdir().expect("temp dir");
    let state = app_state(dir.path());

    let result = dashboard_report_export_impl(
        &state,
        ReportExportParams {
            format: ReportFormat::Markdown,
            config: None,
        },
    )
    .await
    .expect("export");

    assert!(result.file_path.starts_with(dir.path().join("reports").to_string_lossy().as_ref()));
    let content = std::fs::read_to_string(&result.file_path).expect("report content");
    assert!(content.contains("## Bottlenecks"));
    assert!(content.contains("- Closed sales: 8 (5.3%)"));
}

#[tokio::test]
async fn cache_clear_forces_a_fresh_fetch() {
    let dir = tempdir().expect("temp dir");
    let state = app_state(dir.path());

    let first = dashboard_fetch_impl(&state, None, false).await.expect("first");
    let second = dashboard_fetch_impl(&state, None, false).await.expect("second");
    assert!(!first.from_cache);
    assert!(second.from_cache);

    let cleared = state.clear_all_cache();
    assert_eq!(cleared.dashboard_entries_cleared, 1);
    assert_eq!(cleared.insight_entries_cleared, 0);

    let third = dashboard_fetch_impl(&state, None, false).await.expect("third");
    assert!(!third.from_cache);

    let refreshed = dashboard_fetch_impl(&state, None, true).await.expect("refresh");
    assert!(!refreshed.from_cache);
}
