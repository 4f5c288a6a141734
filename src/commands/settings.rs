use crate::models::dashboard::DashboardConfig;
use crate::models::settings::{AppSettingsView, SourceLocatorUpdate};

use super::{AppState, CommandError, CommandResult};

pub fn dashboard_config_update_impl(
    app_state: &AppState,
    config: DashboardConfig,
) -> CommandResult<DashboardConfig> {
    app_state
        .settings()
        .update_dashboard_config(config)
        .map_err(CommandError::from)
}

pub fn source_locator_update_impl(
    app_state: &AppState,
    update: SourceLocatorUpdate,
) -> CommandResult<AppSettingsView> {
    app_state
        .apply_source_update(update)
        .map_err(CommandError::from)
}

/// URL of the configured spreadsheet, for opening in the browser.
pub fn source_url_impl(app_state: &AppState) -> CommandResult<String> {
    app_state.settings().view().spreadsheet_url.ok_or_else(|| {
        CommandError::new("VALIDATION_ERROR", "no spreadsheet configured", None)
    })
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn settings_get(state: tauri::State<'_, AppState>) -> CommandResult<AppSettingsView> {
    Ok(state.settings().view())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn dashboard_config_get(
    state: tauri::State<'_, AppState>,
) -> CommandResult<DashboardConfig> {
    Ok(state.settings().dashboard_config())
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn dashboard_config_update(
    state: tauri::State<'_, AppState>,
    config: DashboardConfig,
) -> CommandResult<DashboardConfig> {
    dashboard_config_update_impl(state.inner(), config)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn source_locator_update(
    state: tauri::State<'_, AppState>,
    update: SourceLocatorUpdate,
) -> CommandResult<AppSettingsView> {
    source_locator_update_impl(state.inner(), update)
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn source_open_in_browser(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> CommandResult<String> {
    use tauri_plugin_opener::OpenerExt;

    let url = source_url_impl(state.inner())?;
    app.opener()
        .open_url(url.as_str(), None::<&str>)
        .map_err(|err| CommandError::new("UNKNOWN", format!("failed to open browser: {err}"), None))?;
    Ok(url)
}
