use serde::{Deserialize, Serialize};

/// Runtime configuration as exposed to the UI. Secrets are masked.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettingsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_url: Option<String>,
    pub has_sheets_api_key: bool,
    pub has_sheets_access_token: bool,
    pub cache_ttl_seconds: u64,
    pub has_ai_api_key: bool,
    pub ai_model: String,
}

/// Runtime update of the spreadsheet locator and its pass-through credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceLocatorUpdate {
    pub spreadsheet: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub cache_ttl_seconds: Option<u64>,
}
