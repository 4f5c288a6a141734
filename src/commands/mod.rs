pub mod ai;
pub mod cache;
pub mod dashboard;
pub mod settings;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::dashboard::DashboardConfig;
use crate::models::settings::{AppSettingsView, SourceLocatorUpdate};
use crate::services::ai_service::AiService;
use crate::services::dashboard_service::DashboardService;
use crate::services::settings_service::{validate_dashboard_config, AppConfig, SettingsService};
use crate::services::sheet_source::{RowSource, SheetsClient};

#[derive(Clone)]
pub struct AppState {
    settings_service: Arc<SettingsService>,
    dashboard_service: Arc<DashboardService>,
    ai_service: Arc<AiService>,
}

impl AppState {
    /// Wires the services from `config`. Reports default to `<data_dir>/reports`.
    pub fn new(config: AppConfig, data_dir: &Path) -> AppResult<Self> {
        let reports_dir = config
            .reports_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("reports"));

        let dashboard = DashboardService::new(reports_dir)?.with_cache_ttl(config.cache_ttl_seconds);
        let dashboard = match sheets_source(&config)? {
            Some(source) => dashboard.with_source(source),
            None => {
                info!(target: "app::config", "no spreadsheet configured yet");
                dashboard
            }
        };
        let ai_service = AiService::new(config.ai.clone())?;

        Ok(Self::from_parts(
            Arc::new(SettingsService::new(config)),
            Arc::new(dashboard),
            Arc::new(ai_service),
        ))
    }

    pub fn from_parts(
        settings_service: Arc<SettingsService>,
        dashboard_service: Arc<DashboardService>,
        ai_service: Arc<AiService>,
    ) -> Self {
        Self {
            settings_service,
            dashboard_service,
            ai_service,
        }
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings_service)
    }

    pub fn dashboard(&self) -> Arc<DashboardService> {
        Arc::clone(&self.dashboard_service)
    }

    pub fn ai(&self) -> Arc<AiService> {
        Arc::clone(&self.ai_service)
    }

    /// Uses the caller's config when given, after the same bounds checks as a
    /// stored update, and the stored config otherwise.
    pub fn resolve_dashboard_config(
        &self,
        supplied: Option<DashboardConfig>,
    ) -> AppResult<DashboardConfig> {
        match supplied {
            Some(config) => {
                validate_dashboard_config(&config)?;
                Ok(config)
            }
            None => Ok(self.settings_service.dashboard_config()),
        }
    }

    /// Applies a new spreadsheet locator or credentials and points the
    /// dashboard at the resulting source.
    pub fn apply_source_update(&self, update: SourceLocatorUpdate) -> AppResult<AppSettingsView> {
        let previous = self.settings_service.update_source(update)?;
        let config = self.settings_service.config();

        self.dashboard_service.set_cache_ttl(config.cache_ttl_seconds);
        self.dashboard_service.set_source(sheets_source(&config)?)?;
        debug!(
            target: "app::config",
            previous = ?previous,
            current = ?config.spreadsheet_id(),
            "dashboard source updated"
        );

        Ok(self.settings_service.view())
    }

    /// Clears every in-memory cache. Configuration is kept.
    pub fn clear_all_cache(&self) -> CacheClearResult {
        let result = CacheClearResult {
            dashboard_entries_cleared: self.dashboard_service.clear_cache(),
            insight_entries_cleared: self.ai_service.clear_cache(),
        };
        info!(
            target: "app::command",
            dashboard = result.dashboard_entries_cleared,
            insights = result.insight_entries_cleared,
            "caches cleared"
        );
        result
    }
}

fn sheets_source(config: &AppConfig) -> AppResult<Option<Arc<dyn RowSource>>> {
    if config.spreadsheet_id().is_none() {
        return Ok(None);
    }
    let client = SheetsClient::new(config.sheets_config()?)?;
    Ok(Some(Arc::new(client)))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheClearResult {
    pub dashboard_entries_cleared: usize,
    pub insight_entries_cleared: usize,
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        let message = error.to_string();
        match error {
            AppError::SourceUnavailable { status, .. } => {
                warn!(target: "app::command", %message, ?status, "source unavailable in command");
                CommandError::new(
                    "SOURCE_UNAVAILABLE",
                    message,
                    status.map(|code| json!({ "status": code })),
                )
            }
            AppError::MissingWorksheet { worksheet } => CommandError::new(
                "MISSING_WORKSHEET",
                message,
                Some(json!({ "worksheet": worksheet })),
            ),
            AppError::MalformedInput {
                worksheet,
                row,
                value,
                ..
            } => CommandError::new(
                "MALFORMED_INPUT",
                message,
                Some(json!({ "worksheet": worksheet, "row": row, "value": value })),
            ),
            AppError::Validation { message, details } => {
                CommandError::new("VALIDATION_ERROR", message, details)
            }
            AppError::Ai {
                code,
                message,
                correlation_id,
                details,
            } => {
                let mut merged = JsonMap::new();
                if let Some(existing) = details {
                    match existing {
                        JsonValue::Object(map) => merged.extend(map),
                        value => {
                            merged.insert("info".to_string(), value);
                        }
                    }
                }
                if let Some(id) = correlation_id {
                    merged.insert("correlationId".to_string(), JsonValue::String(id));
                }
                let detail_value = (!merged.is_empty()).then_some(JsonValue::Object(merged));
                CommandError::new(code.as_str(), message, detail_value)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("UNKNOWN", "serialization failed", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "file system access failed", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}
