use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AppResult;

/// Indicates where a provider response originated.
#[derive(Debug, Clone, Serialize, Deserialize, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiResponseSource {
    Online,
    Offline,
    Cache,
}

impl Default for AiResponseSource {
    fn default() -> Self {
        AiResponseSource::Online
    }
}

/// Metadata describing the provider that produced a response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AiProviderMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<HashMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<JsonValue>,
}

/// Current connectivity status of the insight provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AiStatusDto {
    pub mode: AiResponseSource,
    pub has_api_key: bool,
    pub last_checked_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<AiProviderMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Prose insights generated from a dashboard summary.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InsightReport {
    pub headline: String,
    pub highlights: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<AiProviderMetadata>,
    pub generated_at: String,
    pub source: AiResponseSource,
}

/// Text-generation backend used for dashboard insights.
#[async_trait::async_trait]
pub trait InsightProvider: Send + Sync {
    async fn generate_insights(&self, summary: &JsonValue) -> AppResult<InsightReport>;

    async fn ping(&self) -> AppResult<AiProviderMetadata>;
}
