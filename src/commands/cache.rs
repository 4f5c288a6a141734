#[cfg(feature = "desktop")]
use crate::commands::{AppState, CacheClearResult, CommandResult};

#[cfg(feature = "desktop")]
#[tauri::command]
pub async fn cache_clear_all(state: tauri::State<'_, AppState>) -> CommandResult<CacheClearResult> {
    Ok(state.clear_all_cache())
}
