use std::sync::Arc;

use funnel_dashboard_lib::commands::ai::{ai_status_impl, insights_generate_impl};
use funnel_dashboard_lib::commands::dashboard::{dashboard_fetch_impl, dashboard_report_export_impl};
use funnel_dashboard_lib::commands::settings::{
    dashboard_config_update_impl, source_locator_update_impl, source_url_impl,
};
use funnel_dashboard_lib::commands::{AppState, CommandError};
use funnel_dashboard_lib::error::{AiErrorCode, AppError};
use funnel_dashboard_lib::models::ai_types::AiResponseSource;
use funnel_dashboard_lib::models::dashboard::{DashboardConfig, ReportExportParams};
use funnel_dashboard_lib::models::funnel::{DataIssueKind, StageCount, METRICS_WORKSHEET};
use funnel_dashboard_lib::models::settings::SourceLocatorUpdate;
use funnel_dashboard_lib::services::ai_service::AiService;
use funnel_dashboard_lib::services::dashboard_service::DashboardService;
use funnel_dashboard_lib::services::metrics_engine::{compute_snapshot, compute_snapshot_with_issues};
use funnel_dashboard_lib::services::settings_service::{AiConfig, AppConfig, SettingsService};
use funnel_dashboard_lib::services::sheet_source::InMemorySource;
use serde_json::json;
use tempfile::tempdir;

fn bare_state(dir: &std::path::Path) -> AppState {
    AppState::from_parts(
        Arc::new(SettingsService::new(AppConfig::default())),
        Arc::new(DashboardService::new(dir.join("reports")).expect("dashboard service")),
        Arc::new(AiService::new(AiConfig::default()).expect("ai service")),
    )
}

fn metrics_only() -> InMemorySource {
    InMemorySource::new("metrics-only").with_table(
        METRICS_WORKSHEET,
        &["Stage", "Count"],
        &[&["Total Leads", "40"], &["Qualified Leads", "12"], &["Closed Sales", "2"]],
    )
}

#[test]
fn source_errors_keep_their_status() {
    let error = CommandError::from(AppError::source_unavailable(
        "spreadsheet credentials were rejected",
        Some(403),
    ));
    assert_eq!(error.code, "SOURCE_UNAVAILABLE");
    assert!(error.message.contains("credentials were rejected"));
    assert_eq!(error.details, Some(json!({ "status": 403 })));

    let offline = CommandError::from(AppError::source_unavailable("connection refused", None));
    assert_eq!(offline.code, "SOURCE_UNAVAILABLE");
    assert!(offline.details.is_none());
}

#[test]
fn worksheet_and_cell_errors_name_their_location() {
    let missing = CommandError::from(AppError::missing_worksheet("Metrics"));
    assert_eq!(missing.code, "MISSING_WORKSHEET");
    assert_eq!(missing.message, "worksheet 'Metrics' not found");
    assert_eq!(missing.details, Some(json!({ "worksheet": "Metrics" })));

    let malformed = CommandError::from(AppError::malformed_input(
        "Metrics",
        4,
        "abc",
        "count is not a number",
    ));
    assert_eq!(malformed.code, "MALFORMED_INPUT");
    assert_eq!(
        malformed.details,
        Some(json!({ "worksheet": "Metrics", "row": 4, "value": "abc" }))
    );
}

#[test]
fn ai_errors_merge_details_with_correlation_id() {
    let error = CommandError::from(AppError::ai_with_details(
        AiErrorCode::RateLimited,
        "insight provider rate limit reached",
        Some("corr-1"),
        Some(json!({ "status": 429 })),
    ));
    assert_eq!(error.code, "RATE_LIMITED");
    assert_eq!(error.message, "insight provider rate limit reached");
    assert_eq!(
        error.details,
        Some(json!({ "status": 429, "correlationId": "corr-1" }))
    );

    let scalar = CommandError::from(AppError::ai_with_details(
        AiErrorCode::InvalidResponse,
        "bad body",
        None,
        Some(json!("truncated")),
    ));
    assert_eq!(scalar.details, Some(json!({ "info": "truncated" })));

    let bare = CommandError::from(AppError::ai(AiErrorCode::Unknown, "boom"));
    assert_eq!(bare.code, "UNKNOWN_AI_ERROR");
    assert!(bare.details.is_none());
}

#[test]
fn internal_errors_hide_their_cause() {
    let io = CommandError::from(AppError::from(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        "/secret/path",
    )));
    assert_eq!(io.code, "UNKNOWN");
    assert_eq!(io.message, "file system access failed");

    let serde_error = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    let serialization = CommandError::from(AppError::from(serde_error));
    assert_eq!(serialization.code, "UNKNOWN");
    assert_eq!(serialization.message, "serialization failed");
}

#[test]
fn command_errors_serialize_in_camel_case() {
    let value = serde_json::to_value(CommandError::from(AppError::validation_with_details(
        "projection horizon must be positive",
        json!({ "field": "projectionHorizon" }),
    )))
    .expect("serialize");
    assert_eq!(
        value,
        json!({
            "code": "VALIDATION_ERROR",
            "message": "projection horizon must be positive",
            "details": { "field": "projectionHorizon" }
        })
    );

    let plain = serde_json::to_value(CommandError::new("UNKNOWN", "oops", None)).expect("serialize");
    assert!(plain.get("details").is_none());
}

#[test]
fn strict_snapshot_rejects_malformed_counts_with_row_numbers() {
    let rows = vec![
        StageCount::new("Total Leads", "150"),
        StageCount::new("Qualified Leads", "forty"),
    ];
    match compute_snapshot(&rows) {
        Err(AppError::MalformedInput {
            worksheet, row, value, ..
        }) => {
            assert_eq!(worksheet, METRICS_WORKSHEET);
            assert_eq!(row, 3);
            assert_eq!(value, "forty");
        }
        other => panic!("expected malformed input, got {other:?}"),
    }

    let negative = vec![StageCount::new("Closed Sales", "-2").at_row(9)];
    match compute_snapshot(&negative) {
        Err(AppError::MalformedInput { row, reason, .. }) => {
            assert_eq!(row, 9);
            assert_eq!(reason, "count is negative");
        }
        other => panic!("expected malformed input, got {other:?}"),
    }
}

#[test]
fn lenient_snapshot_flags_unknown_duplicate_and_malformed_rows() {
    let rows = vec![
        StageCount::new("Total Leads", "100"),
        StageCount::new("Walk-ins", "12"),
        StageCount::new("Qualified Leads", "30"),
        StageCount::new("Qualified Leads", "35"),
        StageCount::new("Closed Sales", "2.5"),
    ];
    let (snapshot, issues) = compute_snapshot_with_issues(&rows);

    assert_eq!(snapshot.total_leads(), 100);
    assert_eq!(snapshot.qualified_leads(), 35);
    assert_eq!(snapshot.closed_sales(), 0);

    let kinds: Vec<DataIssueKind> = issues.iter().map(|issue| issue.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DataIssueKind::UnknownStage,
            DataIssueKind::DuplicateStage,
            DataIssueKind::MalformedValue,
        ]
    );
    assert_eq!(issues[0].row, 3);
    assert!(issues[2].message.contains("fractional"));
}

#[tokio::test]
async fn dashboard_without_source_reports_validation_error() {
    let dir = tempdir().expect("temp dir");
    let state = bare_state(dir.path());

    let error = dashboard_fetch_impl(&state, None, false)
        .await
        .expect_err("no source configured");
    assert_eq!(error.code, "VALIDATION_ERROR");

    let url_error = source_url_impl(&state).expect_err("no spreadsheet url");
    assert_eq!(url_error.code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn missing_metrics_worksheet_fails_the_dashboard() {
    let dir = tempdir().expect("temp dir");
    let dashboard = DashboardService::new(dir.path().join("reports"))
        .expect("dashboard service")
        .with_source(Arc::new(InMemorySource::new("empty")));
    let state = AppState::from_parts(
        Arc::new(SettingsService::new(AppConfig::default())),
        Arc::new(dashboard),
        Arc::new(AiService::new(AiConfig::default()).expect("ai service")),
    );

    let error = dashboard_fetch_impl(&state, None, false)
        .await
        .expect_err("metrics worksheet missing");
    assert_eq!(error.code, "MISSING_WORKSHEET");
    assert_eq!(error.details, Some(json!({ "worksheet": "Metrics" })));
}

#[test]
fn invalid_dashboard_config_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let state = bare_state(dir.path());

    let zero_horizon = DashboardConfig {
        projection_horizon: 0,
        ..DashboardConfig::default()
    };
    let error = dashboard_config_update_impl(&state, zero_horizon).expect_err("zero horizon");
    assert_eq!(error.code, "VALIDATION_ERROR");
    assert!(error.message.contains("projection horizon"));

    let wide_window = DashboardConfig {
        trend_window_days: 365,
        ..DashboardConfig::default()
    };
    let error = dashboard_config_update_impl(&state, wide_window).expect_err("window too wide");
    assert!(error.message.contains("trend window"));

    assert_eq!(state.settings().dashboard_config(), DashboardConfig::default());
}

#[test]
fn invalid_source_locator_leaves_settings_untouched() {
    let dir = tempdir().expect("temp dir");
    let state = bare_state(dir.path());

    let error = source_locator_update_impl(
        &state,
        SourceLocatorUpdate {
            spreadsheet: Some("https://example.com/not-a-sheet".to_string()),
            ..SourceLocatorUpdate::default()
        },
    )
    .expect_err("bad locator");
    assert_eq!(error.code, "VALIDATION_ERROR");
    assert!(state.settings().view().spreadsheet.is_none());
    assert!(state.dashboard().source_identity().is_none());
}

#[test]
fn valid_source_locator_points_dashboard_at_sheets() {
    let dir = tempdir().expect("temp dir");
    let state = bare_state(dir.path());

    let view = source_locator_update_impl(
        &state,
        SourceLocatorUpdate {
            spreadsheet: Some(
                "https://docs.google.com/spreadsheets/d/1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789/edit#gid=0"
                    .to_string(),
            ),
            api_key: Some("sheets-key-123456".to_string()),
            ..SourceLocatorUpdate::default()
        },
    )
    .expect("locator accepted");

    assert_eq!(
        view.spreadsheet.as_deref(),
        Some("1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789")
    );
    assert!(view.has_sheets_api_key);
    assert_eq!(
        state.dashboard().source_identity().as_deref(),
        Some("sheets:1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789")
    );
    let url = source_url_impl(&state).expect("spreadsheet url");
    assert!(url.ends_with("/d/1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789/edit"));
}

fn metrics_only_state(dir: &std::path::Path) -> AppState {
    let dashboard = DashboardService::new(dir.join("reports"))
        .expect("dashboard service")
        .with_source(Arc::new(metrics_only()));
    AppState::from_parts(
        Arc::new(SettingsService::new(AppConfig::default())),
        Arc::new(dashboard),
        Arc::new(AiService::new(AiConfig::default()).expect("ai service")),
    )
}

#[tokio::test]
async fn insights_without_api_key_report_missing_key() {
    let dir = tempdir().expect("temp dir");
    let state = metrics_only_state(dir.path());

    let enabled = DashboardConfig {
        show_ai_insights: true,
        ..DashboardConfig::default()
    };
    let error = insights_generate_impl(&state, Some(enabled))
        .await
        .expect_err("no api key");
    assert_eq!(error.code, "MISSING_API_KEY");

    let status = ai_status_impl(&state).await.expect("status");
    assert_eq!(status.mode, AiResponseSource::Offline);
    assert!(!status.has_api_key);
}

#[tokio::test]
async fn insights_are_refused_while_the_toggle_is_off() {
    let dir = tempdir().expect("temp dir");
    let state = metrics_only_state(dir.path());
    assert!(!state.settings().dashboard_config().show_ai_insights);

    let error = insights_generate_impl(&state, None)
        .await
        .expect_err("insights disabled");
    assert_eq!(error.code, "VALIDATION_ERROR");
    assert_eq!(error.details, Some(json!({ "field": "showAiInsights" })));

    dashboard_config_update_impl(
        &state,
        DashboardConfig {
            show_ai_insights: true,
            ..DashboardConfig::default()
        },
    )
    .expect("enable insights");
    let error = insights_generate_impl(&state, None)
        .await
        .expect_err("no api key");
    assert_eq!(error.code, "MISSING_API_KEY");
}

#[tokio::test]
async fn caller_supplied_configs_are_bounds_checked() {
    let dir = tempdir().expect("temp dir");
    let state = metrics_only_state(dir.path());
    let huge_window = DashboardConfig {
        trend_window_days: u32::MAX,
        show_ai_insights: true,
        ..DashboardConfig::default()
    };

    for force_refresh in [false, true] {
        let error = dashboard_fetch_impl(&state, Some(huge_window.clone()), force_refresh)
            .await
            .expect_err("window out of range");
        assert_eq!(error.code, "VALIDATION_ERROR");
        assert_eq!(
            error.details,
            Some(json!({ "field": "trendWindowDays", "max": 90 }))
        );
    }

    let export = dashboard_report_export_impl(
        &state,
        ReportExportParams {
            config: Some(DashboardConfig {
                projection_horizon: 0,
                ..DashboardConfig::default()
            }),
            ..ReportExportParams::default()
        },
    )
    .await
    .expect_err("zero horizon");
    assert_eq!(export.code, "VALIDATION_ERROR");
    assert!(export.message.contains("projection horizon"));

    let insights = insights_generate_impl(&state, Some(huge_window))
        .await
        .expect_err("window out of range");
    assert_eq!(insights.code, "VALIDATION_ERROR");
    assert!(insights.message.contains("trend window"));

    assert!(dashboard_fetch_impl(&state, None, false).await.is_ok());
}
