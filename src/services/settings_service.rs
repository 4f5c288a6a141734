use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration as StdDuration;

use serde_json::json;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::dashboard::DashboardConfig;
use crate::models::settings::{AppSettingsView, SourceLocatorUpdate};
use crate::services::sheet_source::{
    extract_spreadsheet_id, spreadsheet_url, SheetsConfig, DEFAULT_SHEETS_BASE_URL,
};

const ENV_SPREADSHEET: &str = "FUNNEL_SPREADSHEET";
const ENV_SHEETS_API_KEY: &str = "FUNNEL_SHEETS_API_KEY";
const ENV_SHEETS_ACCESS_TOKEN: &str = "FUNNEL_SHEETS_ACCESS_TOKEN";
const ENV_SHEETS_BASE_URL: &str = "FUNNEL_SHEETS_BASE_URL";
const ENV_CACHE_TTL: &str = "FUNNEL_CACHE_TTL_SECS";
const ENV_PROJECTION_HORIZON: &str = "FUNNEL_PROJECTION_HORIZON";
const ENV_AI_API_KEY: &str = "FUNNEL_AI_API_KEY";
const ENV_AI_BASE_URL: &str = "FUNNEL_AI_BASE_URL";
const ENV_AI_MODEL: &str = "FUNNEL_AI_MODEL";
const ENV_REPORTS_DIR: &str = "FUNNEL_REPORTS_DIR";

pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;
pub const MIN_CACHE_TTL_SECS: u64 = 5;
pub const MAX_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_AI_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_AI_MODEL: &str = "deepseek-chat";
const MAX_PROJECTION_HORIZON: u64 = 1_000_000;
const MAX_TREND_WINDOW_DAYS: u32 = 90;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub http_timeout: StdDuration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_AI_BASE_URL.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            http_timeout: StdDuration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Spreadsheet URL or id as supplied.
    pub spreadsheet: Option<String>,
    pub sheets_api_key: Option<String>,
    pub sheets_access_token: Option<String>,
    pub sheets_base_url: String,
    pub cache_ttl_seconds: u64,
    pub projection_horizon: u64,
    pub reports_dir: Option<PathBuf>,
    pub ai: AiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            spreadsheet: None,
            sheets_api_key: None,
            sheets_access_token: None,
            sheets_base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECS,
            projection_horizon: crate::models::dashboard::DEFAULT_PROJECTION_HORIZON,
            reports_dir: None,
            ai: AiConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = Self::default();
        let cache_ttl_seconds = read(ENV_CACHE_TTL)
            .and_then(|value| parse_number(ENV_CACHE_TTL, &value))
            .map(clamp_cache_ttl)
            .unwrap_or(defaults.cache_ttl_seconds);
        let projection_horizon = read(ENV_PROJECTION_HORIZON)
            .and_then(|value| parse_number(ENV_PROJECTION_HORIZON, &value))
            .filter(|value| *value > 0 && *value <= MAX_PROJECTION_HORIZON)
            .unwrap_or(defaults.projection_horizon);

        Self {
            spreadsheet: read(ENV_SPREADSHEET),
            sheets_api_key: read(ENV_SHEETS_API_KEY),
            sheets_access_token: read(ENV_SHEETS_ACCESS_TOKEN),
            sheets_base_url: read(ENV_SHEETS_BASE_URL).unwrap_or(defaults.sheets_base_url),
            cache_ttl_seconds,
            projection_horizon,
            reports_dir: read(ENV_REPORTS_DIR).map(PathBuf::from),
            ai: AiConfig {
                api_key: read(ENV_AI_API_KEY),
                base_url: read(ENV_AI_BASE_URL).unwrap_or(defaults.ai.base_url),
                model: read(ENV_AI_MODEL).unwrap_or(defaults.ai.model),
                http_timeout: defaults.ai.http_timeout,
            },
        }
    }

    pub fn spreadsheet_id(&self) -> Option<String> {
        self.spreadsheet.as_deref().and_then(extract_spreadsheet_id)
    }

    pub fn sheets_config(&self) -> AppResult<SheetsConfig> {
        let spreadsheet_id = self.spreadsheet_id().ok_or_else(|| {
            AppError::validation("no spreadsheet configured; set FUNNEL_SPREADSHEET or update the source locator")
        })?;

        let mut config = SheetsConfig::new(spreadsheet_id);
        config.api_key = self.sheets_api_key.clone();
        config.access_token = self.sheets_access_token.clone();
        config.base_url = self.sheets_base_url.clone();
        Ok(config)
    }
}

pub fn clamp_cache_ttl(seconds: u64) -> u64 {
    seconds.clamp(MIN_CACHE_TTL_SECS, MAX_CACHE_TTL_SECS)
}

fn parse_number(key: &str, value: &str) -> Option<u64> {
    match value.parse::<u64>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(target: "app::config", %key, %value, error = %err, "ignoring invalid numeric setting");
            None
        }
    }
}

/// Masks a secret, keeping the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

/// Runtime configuration holder shared by the commands.
pub struct SettingsService {
    config: RwLock<AppConfig>,
    dashboard: RwLock<DashboardConfig>,
}

impl SettingsService {
    pub fn new(config: AppConfig) -> Self {
        let dashboard = DashboardConfig {
            projection_horizon: config.projection_horizon,
            ..DashboardConfig::default()
        };
        Self {
            config: RwLock::new(config),
            dashboard: RwLock::new(dashboard),
        }
    }

    pub fn config(&self) -> AppConfig {
        self.config
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn dashboard_config(&self) -> DashboardConfig {
        self.dashboard
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn update_dashboard_config(&self, next: DashboardConfig) -> AppResult<DashboardConfig> {
        validate_dashboard_config(&next)?;
        let mut guard = self
            .dashboard
            .write()
            .map_err(|_| AppError::other("dashboard configuration lock poisoned"))?;
        *guard = next.clone();
        info!(target: "app::config", "dashboard configuration updated");
        Ok(next)
    }

    /// Applies a runtime source update. Returns the previous spreadsheet id,
    /// so callers can drop data cached for it.
    pub fn update_source(&self, update: SourceLocatorUpdate) -> AppResult<Option<String>> {
        let mut guard = self
            .config
            .write()
            .map_err(|_| AppError::other("configuration lock poisoned"))?;
        let previous = guard.spreadsheet_id();

        if let Some(locator) = update.spreadsheet {
            let trimmed = locator.trim();
            if extract_spreadsheet_id(trimmed).is_none() {
                return Err(AppError::validation(format!(
                    "'{trimmed}' is not a spreadsheet URL or id"
                )));
            }
            guard.spreadsheet = Some(trimmed.to_string());
        }
        if let Some(api_key) = update.api_key {
            guard.sheets_api_key = non_blank(api_key);
        }
        if let Some(token) = update.access_token {
            guard.sheets_access_token = non_blank(token);
        }
        if let Some(ttl) = update.cache_ttl_seconds {
            guard.cache_ttl_seconds = clamp_cache_ttl(ttl);
        }

        info!(
            target: "app::config",
            spreadsheet = ?guard.spreadsheet_id(),
            api_key = ?guard.sheets_api_key.as_deref().map(mask_secret),
            cache_ttl = guard.cache_ttl_seconds,
            "source locator updated"
        );
        Ok(previous)
    }

    pub fn view(&self) -> AppSettingsView {
        let config = self.config();
        let spreadsheet_id = config.spreadsheet_id();
        AppSettingsView {
            spreadsheet_url: spreadsheet_id.as_deref().map(spreadsheet_url),
            spreadsheet: spreadsheet_id,
            has_sheets_api_key: config.sheets_api_key.is_some(),
            has_sheets_access_token: config.sheets_access_token.is_some(),
            cache_ttl_seconds: config.cache_ttl_seconds,
            has_ai_api_key: config.ai.api_key.is_some(),
            ai_model: config.ai.model.clone(),
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Bounds checks shared by stored and caller-supplied dashboard configs.
pub(crate) fn validate_dashboard_config(config: &DashboardConfig) -> AppResult<()> {
    if config.projection_horizon == 0 || config.projection_horizon > MAX_PROJECTION_HORIZON {
        return Err(AppError::validation_with_details(
            format!("projection horizon must be between 1 and {MAX_PROJECTION_HORIZON}"),
            json!({ "field": "projectionHorizon", "max": MAX_PROJECTION_HORIZON }),
        ));
    }
    if config.trend_window_days == 0 || config.trend_window_days > MAX_TREND_WINDOW_DAYS {
        return Err(AppError::validation_with_details(
            format!("trend window must be between 1 and {MAX_TREND_WINDOW_DAYS} days"),
            json!({ "field": "trendWindowDays", "max": MAX_TREND_WINDOW_DAYS }),
        ));
    }
    Ok(())
}
