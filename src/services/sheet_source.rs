use std::collections::HashMap;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
const HTTP_TIMEOUT_SECS: u64 = 20;
const MISSING_RANGE_MARKER: &str = "Unable to parse range";

static SPREADSHEET_URL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").ok());
static SPREADSHEET_ID_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").ok());

/// One data row of a worksheet, keyed by its header cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRecord {
    /// 1-based sheet row; the header occupies row 1.
    pub row: usize,
    values: HashMap<String, String>,
}

impl SheetRecord {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.values.insert(normalize_header(column), value.into());
    }

    /// Cell text for a column, matched on trimmed case-insensitive headers.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(&normalize_header(column))
            .map(String::as_str)
    }

    /// Builds records from a header row followed by data rows, the way the
    /// values API lays them out. Blank rows are skipped.
    pub fn from_rows(header: &[String], rows: &[Vec<String>]) -> Vec<SheetRecord> {
        rows.iter()
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|cell| !cell.trim().is_empty()))
            .map(|(index, cells)| {
                let mut record = SheetRecord::new(index + 2);
                for (column, name) in header.iter().enumerate() {
                    if name.trim().is_empty() {
                        continue;
                    }
                    let value = cells.get(column).cloned().unwrap_or_default();
                    record.insert(name, value);
                }
                record
            })
            .collect()
    }
}

fn normalize_header(column: &str) -> String {
    column.trim().to_ascii_lowercase()
}

/// External row store addressed by worksheet name.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Stable identity of the backing spreadsheet, used as the cache key.
    fn identity(&self) -> String;

    async fn fetch_worksheet(&self, worksheet: &str) -> AppResult<Vec<SheetRecord>>;
}

/// Accepts a full spreadsheet URL or a bare spreadsheet id.
pub fn extract_spreadsheet_id(locator: &str) -> Option<String> {
    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(pattern) = SPREADSHEET_URL_PATTERN.as_ref() {
        if let Some(captures) = pattern.captures(trimmed) {
            return captures.get(1).map(|id| id.as_str().to_string());
        }
    }

    SPREADSHEET_ID_PATTERN
        .as_ref()
        .filter(|pattern| pattern.is_match(trimmed))
        .map(|_| trimmed.to_string())
}

pub fn spreadsheet_url(spreadsheet_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{spreadsheet_id}/edit")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub base_url: String,
    pub timeout: StdDuration,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            api_key: None,
            access_token: None,
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            timeout: StdDuration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

/// Google Sheets v4 values API client.
pub struct SheetsClient {
    client: reqwest::Client,
    config: SheetsConfig,
}

impl SheetsClient {
    pub fn new(config: SheetsConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build Sheets HTTP client: {err}")))?;

        Ok(Self { client, config })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.config.spreadsheet_id
    }

    fn values_url(&self, worksheet: &str) -> AppResult<Url> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = Url::parse(base).map_err(|err| {
            AppError::validation(format!("invalid Sheets base URL '{base}': {err}"))
        })?;

        url.path_segments_mut()
            .map_err(|_| AppError::validation(format!("Sheets base URL '{base}' cannot hold a path")))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.config.spreadsheet_id.as_str(), "values", worksheet]);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("valueRenderOption", "UNFORMATTED_VALUE");
            query.append_pair("dateTimeRenderOption", "FORMATTED_STRING");
            if let Some(key) = self.config.api_key.as_deref() {
                query.append_pair("key", key);
            }
        }

        Ok(url)
    }

    fn map_http_error(status: StatusCode, body: &str, worksheet: &str) -> AppError {
        if status == StatusCode::BAD_REQUEST && body.contains(MISSING_RANGE_MARKER) {
            return AppError::missing_worksheet(worksheet);
        }

        let message = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                "spreadsheet credentials were rejected".to_string()
            }
            StatusCode::NOT_FOUND => "spreadsheet not found".to_string(),
            StatusCode::TOO_MANY_REQUESTS => "Sheets API quota exhausted".to_string(),
            status if status.is_server_error() => {
                format!("Sheets API returned server error {}", status.as_u16())
            }
            status => format!("Sheets API request failed with status {}", status.as_u16()),
        };
        AppError::source_unavailable(message, Some(status.as_u16()))
    }
}

#[async_trait]
impl RowSource for SheetsClient {
    fn identity(&self) -> String {
        format!("sheets:{}", self.config.spreadsheet_id)
    }

    async fn fetch_worksheet(&self, worksheet: &str) -> AppResult<Vec<SheetRecord>> {
        let url = self.values_url(worksheet)?;
        debug!(target: "app::sheets", %worksheet, spreadsheet = %self.config.spreadsheet_id, "fetching worksheet");

        let mut request = self.client.get(url);
        if let Some(token) = self.config.access_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|err| {
            let message = if err.is_timeout() {
                format!("Sheets API request timed out: {err}")
            } else {
                format!("could not reach Sheets API: {err}")
            };
            AppError::source_unavailable(message, None)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body, worksheet));
        }

        let range: ValueRange = response.json().await.map_err(|err| {
            AppError::source_unavailable(format!("unexpected Sheets API payload: {err}"), Some(status.as_u16()))
        })?;

        let mut rows = range.values.into_iter().map(|cells| {
            cells.iter().map(cell_text).collect::<Vec<String>>()
        });
        let Some(header) = rows.next() else {
            warn!(target: "app::sheets", %worksheet, "worksheet is empty");
            return Ok(Vec::new());
        };
        let data: Vec<Vec<String>> = rows.collect();
        let records = SheetRecord::from_rows(&header, &data);

        debug!(target: "app::sheets", %worksheet, rows = records.len(), "worksheet fetched");
        Ok(records)
    }
}

fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(text) => text.clone(),
        JsonValue::Bool(flag) => (if *flag { "TRUE" } else { "FALSE" }).to_string(),
        JsonValue::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

/// Worksheet-name to records map, used for demos and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    identity: String,
    worksheets: HashMap<String, Vec<SheetRecord>>,
}

impl InMemorySource {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            worksheets: HashMap::new(),
        }
    }

    pub fn with_worksheet(mut self, name: &str, records: Vec<SheetRecord>) -> Self {
        self.worksheets.insert(name.to_string(), records);
        self
    }

    /// Adds a worksheet from a header row and string rows.
    pub fn with_table(self, name: &str, header: &[&str], rows: &[&[&str]]) -> Self {
        let header: Vec<String> = header.iter().map(|cell| cell.to_string()).collect();
        let rows: Vec<Vec<String>> = rows
            .iter()
            .map(|cells| cells.iter().map(|cell| cell.to_string()).collect())
            .collect();
        let records = SheetRecord::from_rows(&header, &rows);
        self.with_worksheet(name, records)
    }
}

#[async_trait]
impl RowSource for InMemorySource {
    fn identity(&self) -> String {
        format!("memory:{}", self.identity)
    }

    async fn fetch_worksheet(&self, worksheet: &str) -> AppResult<Vec<SheetRecord>> {
        self.worksheets
            .get(worksheet)
            .cloned()
            .ok_or_else(|| AppError::missing_worksheet(worksheet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_spreadsheet_id_from_url_or_bare_id() {
        assert_eq!(
            extract_spreadsheet_id(
                "https://docs.google.com/spreadsheets/d/1AbC-dEf_123/edit#gid=0"
            )
            .as_deref(),
            Some("1AbC-dEf_123")
        );
        assert_eq!(
            extract_spreadsheet_id("  1AbC-dEf_123 ").as_deref(),
            Some("1AbC-dEf_123")
        );
        assert!(extract_spreadsheet_id("").is_none());
        assert!(extract_spreadsheet_id("not a sheet url").is_none());
    }

    #[test]
    fn records_pad_short_rows_and_skip_blank_rows() {
        let header = vec!["Stage".to_string(), " Count ".to_string()];
        let rows = vec![
            vec!["Total Leads".to_string(), "150".to_string()],
            vec![String::new(), String::new()],
            vec!["Closed Sales".to_string()],
        ];
        let records = SheetRecord::from_rows(&header, &rows);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].row, 2);
        assert_eq!(records[0].get("count"), Some("150"));
        assert_eq!(records[1].row, 4);
        assert_eq!(records[1].get("Count"), Some(""));
        assert_eq!(records[1].get("STAGE"), Some("Closed Sales"));
    }

    #[test]
    fn cell_text_renders_unformatted_values() {
        assert_eq!(cell_text(&serde_json::json!(150)), "150");
        assert_eq!(cell_text(&serde_json::json!(12.5)), "12.5");
        assert_eq!(cell_text(&serde_json::json!(null)), "");
        assert_eq!(cell_text(&serde_json::json!(true)), "TRUE");
        assert_eq!(cell_text(&serde_json::json!("Facebook")), "Facebook");
    }

    #[test]
    fn values_url_encodes_worksheet_and_credentials() {
        let mut config = SheetsConfig::new("sheet-1");
        config.base_url = "http://localhost:9000/".to_string();
        config.api_key = Some("key-123".to_string());
        let client = SheetsClient::new(config).expect("client");

        let url = client.values_url("Lead Tracker").expect("url");
        assert_eq!(url.path(), "/v4/spreadsheets/sheet-1/values/Lead%20Tracker");
        let query = url.query().unwrap_or_default();
        assert!(query.contains("valueRenderOption=UNFORMATTED_VALUE"));
        assert!(query.contains("key=key-123"));
    }

    #[test]
    fn http_errors_map_to_source_errors() {
        let missing = SheetsClient::map_http_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Unable to parse range: Daily"}}"#,
            "Daily",
        );
        assert!(missing.is_missing_worksheet());

        let forbidden = SheetsClient::map_http_error(StatusCode::FORBIDDEN, "", "Metrics");
        assert!(matches!(
            forbidden,
            AppError::SourceUnavailable {
                status: Some(403),
                ..
            }
        ));

        let bad_request = SheetsClient::map_http_error(StatusCode::BAD_REQUEST, "other", "Metrics");
        assert!(matches!(bad_request, AppError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn in_memory_source_reports_missing_worksheets() {
        let source = InMemorySource::new("demo").with_table(
            "Metrics",
            &["Stage", "Count"],
            &[&["Total Leads", "10"]],
        );

        assert_eq!(source.identity(), "memory:demo");
        let records = source.fetch_worksheet("Metrics").await.expect("records");
        assert_eq!(records[0].get("Stage"), Some("Total Leads"));

        let err = source.fetch_worksheet("Daily").await.expect_err("missing");
        assert!(err.is_missing_worksheet());
    }
}
