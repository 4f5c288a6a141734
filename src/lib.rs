pub mod commands;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    if let Err(error) = try_run() {
        eprintln!("failed to launch application: {error}");
    }
}

#[cfg(feature = "desktop")]
fn try_run() -> Result<(), Box<dyn std::error::Error>> {
    use tauri::Manager;

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let handle = app.handle();

            let data_dir = handle
                .path()
                .app_data_dir()
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;
            std::fs::create_dir_all(&data_dir)?;

            crate::utils::logger::init_logging(&data_dir.join("logs"))
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;

            let config = crate::services::settings_service::AppConfig::from_env();
            let state = crate::commands::AppState::new(config, &data_dir)
                .map_err(|err| Box::new(err) as Box<dyn std::error::Error>)?;
            app.manage(state);

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            crate::commands::dashboard::dashboard_fetch,
            crate::commands::dashboard::dashboard_refresh,
            crate::commands::dashboard::dashboard_report_export,
            crate::commands::settings::settings_get,
            crate::commands::settings::dashboard_config_get,
            crate::commands::settings::dashboard_config_update,
            crate::commands::settings::source_locator_update,
            crate::commands::settings::source_open_in_browser,
            crate::commands::ai::insights_generate,
            crate::commands::ai::ai_status,
            crate::commands::cache::cache_clear_all,
        ])
        .run(tauri::generate_context!())?;

    Ok(())
}
