use tracing::{debug, warn};

use crate::models::dashboard::{
    DashboardConfig, DashboardResponse, ReportExportParams, ReportExportResult,
};

use super::{AppState, CommandError, CommandResult};

pub async fn dashboard_fetch_impl(
    app_state: &AppState,
    config: Option<DashboardConfig>,
    force_refresh: bool,
) -> CommandResult<DashboardResponse> {
    let config = app_state
        .resolve_dashboard_config(config)
        .map_err(CommandError::from)?;
    let dashboard = app_state.dashboard();
    let result = if force_refresh {
        dashboard.refresh(&config).await
    } else {
        dashboard.fetch(&config).await
    };

    match result {
        Ok(response) => {
            debug!(
                target: "app::command",
                from_cache = response.from_cache,
                issues = response.issues.len(),
                "dashboard assembled"
            );
            Ok(response)
        }
        Err(error) => {
            warn!(target: "app::command", error = %error, force_refresh, "dashboard fetch failed");
            Err(CommandError::from(error))
        }
    }
}

pub async fn dashboard_report_export_impl(
    app_state: &AppState,
    params: ReportExportParams,
) -> CommandResult<ReportExportResult> {
    let config = app_state
        .resolve_dashboard_config(params.config)
        .map_err(CommandError::from)?;
    app_state
        .dashboard()
        .export_report(&config, params.format)
        .await
        .map_err(CommandError::from)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn dashboard_fetch(
    state: tauri::State<'_, AppState>,
    config: Option<DashboardConfig>,
) -> CommandResult<DashboardResponse> {
    dashboard_fetch_impl(state.inner(), config, false).await
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn dashboard_refresh(
    state: tauri::State<'_, AppState>,
    config: Option<DashboardConfig>,
) -> CommandResult<DashboardResponse> {
    dashboard_fetch_impl(state.inner(), config, true).await
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn dashboard_report_export(
    state: tauri::State<'_, AppState>,
    params: Option<ReportExportParams>,
) -> CommandResult<ReportExportResult> {
    dashboard_report_export_impl(state.inner(), params.unwrap_or_default()).await
}
