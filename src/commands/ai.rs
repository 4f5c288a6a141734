use serde_json::json;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::ai_types::{AiStatusDto, InsightReport};
use crate::models::dashboard::DashboardConfig;

use super::{AppState, CommandError, CommandResult};

/// Generates prose insights for the dashboard built from `config`. Fails
/// with `VALIDATION_ERROR` while the AI insights toggle is off.
pub async fn insights_generate_impl(
    app_state: &AppState,
    config: Option<DashboardConfig>,
) -> CommandResult<InsightReport> {
    let config = app_state
        .resolve_dashboard_config(config)
        .map_err(CommandError::from)?;
    if !config.show_ai_insights {
        return Err(CommandError::from(AppError::validation_with_details(
            "AI insights are disabled in the dashboard config",
            json!({ "field": "showAiInsights" }),
        )));
    }
    let response = app_state
        .dashboard()
        .fetch(&config)
        .await
        .map_err(CommandError::from)?;

    match app_state.ai().generate_insights(&response).await {
        Ok(report) => {
            let correlation_id = report
                .provider
                .as_ref()
                .and_then(|meta| meta.extra.as_ref())
                .and_then(|extra| extra.get("correlationId"))
                .and_then(|value| value.as_str())
                .unwrap_or("-");
            debug!(
                target: "app::command",
                source = ?report.source,
                correlation_id = %correlation_id,
                "insights_generate completed"
            );
            Ok(report)
        }
        Err(error) => {
            let correlation_id = error.ai_correlation_id().unwrap_or("-");
            warn!(
                target: "app::command",
                error = %error,
                correlation_id = %correlation_id,
                "insights_generate failed"
            );
            Err(CommandError::from(error))
        }
    }
}

pub async fn ai_status_impl(app_state: &AppState) -> CommandResult<AiStatusDto> {
    app_state.ai().status().await.map_err(CommandError::from)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn insights_generate(
    state: tauri::State<'_, AppState>,
    config: Option<DashboardConfig>,
) -> CommandResult<InsightReport> {
    insights_generate_impl(state.inner(), config).await
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn ai_status(state: tauri::State<'_, AppState>) -> CommandResult<AiStatusDto> {
    ai_status_impl(state.inner()).await
}
