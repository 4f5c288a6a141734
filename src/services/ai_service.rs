use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration as StdDuration, Instant};

use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AiErrorCode, AppError, AppResult};
use crate::models::ai_types::{
    AiProviderMetadata, AiResponseSource, AiStatusDto, InsightProvider, InsightReport,
};
use crate::models::dashboard::DashboardResponse;
use crate::services::ai_cache::{AiCacheKey, InsightCache};
use crate::services::prompt_templates::{build_insights_payload, insights_system_prompt};
use crate::services::settings_service::AiConfig;
use crate::utils::redact::redact_sensitive_data;
use crate::utils::semantic::semantic_hash;

const DEFAULT_BACKOFF_SECS: [u64; 4] = [0, 1, 2, 4];
const INSIGHTS_TEMPERATURE: f32 = 0.3;

/// Optional prose insights on top of the rule-based cards.
pub struct AiService {
    config: RwLock<AiConfig>,
    provider: RwLock<Option<Arc<dyn InsightProvider>>>,
    cache: InsightCache,
}

impl AiService {
    pub fn new(config: AiConfig) -> AppResult<Self> {
        let provider = build_provider(&config)?;
        Ok(Self {
            config: RwLock::new(config),
            provider: RwLock::new(provider),
            cache: InsightCache::default(),
        })
    }

    /// Uses a caller-supplied provider regardless of the configured key.
    pub fn with_provider(config: AiConfig, provider: Arc<dyn InsightProvider>) -> Self {
        Self {
            config: RwLock::new(config),
            provider: RwLock::new(Some(provider)),
            cache: InsightCache::default(),
        }
    }

    pub fn update_config(&self, config: AiConfig) -> AppResult<()> {
        let provider = build_provider(&config)?;
        {
            let mut guard = self
                .config
                .write()
                .map_err(|_| AppError::other("ai configuration lock poisoned"))?;
            *guard = config;
        }
        let mut guard = self
            .provider
            .write()
            .map_err(|_| AppError::other("ai provider lock poisoned"))?;
        *guard = provider;
        self.cache.clear();
        info!(target: "app::ai", "insight provider reconfigured");
        Ok(())
    }

    pub async fn generate_insights(&self, response: &DashboardResponse) -> AppResult<InsightReport> {
        let provider = self.current_provider()?;
        let model = self.model();

        let payload = build_insights_payload(response);
        let redacted = redact_sensitive_data(&payload)?;
        let key = AiCacheKey::new(model.as_str(), semantic_hash(&redacted, &model));

        if let Some(mut cached) = self.cache.get(&key) {
            debug!(target: "app::ai::cache", hash = key.semantic_hash(), "insight cache hit");
            cached.source = AiResponseSource::Cache;
            return Ok(cached);
        }

        let mut report = provider.generate_insights(&redacted).await?;
        report.source = AiResponseSource::Online;
        if report.generated_at.is_empty() {
            report.generated_at = Utc::now().to_rfc3339();
        }
        self.cache.put(&key, report.clone());
        Ok(report)
    }

    pub async fn status(&self) -> AppResult<AiStatusDto> {
        let last_checked_at = Utc::now().to_rfc3339();
        let provider = match self.current_provider() {
            Ok(provider) => provider,
            Err(_) => {
                return Ok(AiStatusDto {
                    mode: AiResponseSource::Offline,
                    has_api_key: false,
                    last_checked_at,
                    latency_ms: None,
                    provider: None,
                    message: Some("insight provider API key not configured".to_string()),
                });
            }
        };

        match provider.ping().await {
            Ok(metadata) => Ok(AiStatusDto {
                mode: AiResponseSource::Online,
                has_api_key: true,
                last_checked_at,
                latency_ms: metadata.latency_ms,
                provider: Some(metadata),
                message: None,
            }),
            Err(error) => {
                warn!(target: "app::ai", error = %error, "insight provider ping failed");
                Err(error)
            }
        }
    }

    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    fn model(&self) -> String {
        self.config
            .read()
            .map(|guard| guard.model.clone())
            .unwrap_or_default()
    }

    fn current_provider(&self) -> AppResult<Arc<dyn InsightProvider>> {
        let guard = self
            .provider
            .read()
            .map_err(|_| AppError::other("ai provider lock poisoned"))?;
        guard.as_ref().cloned().ok_or_else(|| {
            AppError::ai(
                AiErrorCode::MissingApiKey,
                "insight provider API key not configured",
            )
        })
    }
}

fn build_provider(config: &AiConfig) -> AppResult<Option<Arc<dyn InsightProvider>>> {
    match &config.api_key {
        Some(api_key) => {
            let provider = ChatCompletionsProvider::try_new(config, api_key.clone())?;
            Ok(Some(Arc::new(provider)))
        }
        None => Ok(None),
    }
}

/// OpenAI-compatible chat-completions client (DeepSeek by default).
pub struct ChatCompletionsProvider {
    client: reqwest::Client,
    api_key: String,
    provider_id: String,
    base_url: String,
    endpoint: String,
    model: String,
    backoff: Vec<StdDuration>,
}

struct ChatInvocationResult {
    content: JsonValue,
    tokens_used: HashMap<String, u64>,
    latency_ms: u128,
    correlation_id: String,
}

impl ChatCompletionsProvider {
    pub fn try_new(config: &AiConfig, api_key: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build AI HTTP client: {err}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let provider_id = Url::parse(&base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "chat-completions".to_string());

        Ok(Self {
            client,
            api_key,
            provider_id,
            endpoint: format!("{base_url}/v1/chat/completions"),
            base_url,
            model: config.model.clone(),
            backoff: DEFAULT_BACKOFF_SECS
                .iter()
                .map(|secs| StdDuration::from_secs(*secs))
                .collect(),
        })
    }

    /// Replaces the retry delays; one attempt is made per entry.
    pub fn with_backoff(mut self, backoff: Vec<StdDuration>) -> Self {
        if !backoff.is_empty() {
            self.backoff = backoff;
        }
        self
    }

    async fn invoke_chat(&self, payload: &JsonValue) -> AppResult<ChatInvocationResult> {
        let correlation_id = Uuid::new_v4().to_string();
        let request_body = self.build_request_body(payload);
        let attempts = self.backoff.len();
        let mut last_error: Option<AppError> = None;

        for (attempt, delay) in self.backoff.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }

            debug!(
                target: "app::ai",
                provider = %self.provider_id,
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                "invoking insight provider"
            );

            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            let (error, retryable) = match response {
                Ok(resp) if resp.status().is_success() => {
                    let latency_ms = start.elapsed().as_millis();
                    let body: JsonValue = resp.json().await.map_err(|err| {
                        AppError::ai_with_details(
                            AiErrorCode::InvalidResponse,
                            "failed to decode provider response",
                            Some(correlation_id.as_str()),
                            Some(json!({ "reason": err.to_string() })),
                        )
                    })?;

                    let content = body
                        .pointer("/choices/0/message/content")
                        .and_then(JsonValue::as_str)
                        .ok_or_else(|| {
                            AppError::ai_with_details(
                                AiErrorCode::InvalidResponse,
                                "provider response is missing message.content",
                                Some(correlation_id.as_str()),
                                Some(json!({ "reason": "missing_message_content" })),
                            )
                        })?;

                    debug!(target: "app::ai", correlation_id = %correlation_id, latency_ms, "insight provider responded");
                    return Ok(ChatInvocationResult {
                        content: parse_content(content, &correlation_id)?,
                        tokens_used: extract_tokens(&body),
                        latency_ms,
                        correlation_id,
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let (error, retryable) = map_http_error(status, &correlation_id);
                    warn!(
                        target: "app::ai",
                        correlation_id = %correlation_id,
                        status = status.as_u16(),
                        retryable,
                        "insight provider returned non-success status"
                    );
                    (error, retryable)
                }
                Err(err) => {
                    let (error, retryable) = error_from_reqwest(err, &correlation_id);
                    warn!(
                        target: "app::ai",
                        correlation_id = %correlation_id,
                        retryable,
                        "insight provider request failed"
                    );
                    (error, retryable)
                }
            };

            if !retryable || attempt + 1 == attempts {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::ai_with_details(
                AiErrorCode::ProviderUnavailable,
                "insight provider request failed",
                Some(correlation_id.as_str()),
                None,
            )
        }))
    }

    fn build_request_body(&self, payload: &JsonValue) -> JsonValue {
        let user_content = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        json!({
            "model": self.model,
            "temperature": INSIGHTS_TEMPERATURE,
            "top_p": 0.9,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": insights_system_prompt() },
                { "role": "user", "content": user_content }
            ]
        })
    }

    fn build_provider_metadata(
        &self,
        tokens_used: HashMap<String, u64>,
        latency_ms: u128,
        correlation_id: &str,
    ) -> AiProviderMetadata {
        AiProviderMetadata {
            provider_id: Some(self.provider_id.clone()),
            model: Some(self.model.clone()),
            latency_ms: Some(latency_ms),
            tokens_used: (!tokens_used.is_empty()).then_some(tokens_used),
            extra: Some(json!({ "correlationId": correlation_id })),
        }
    }
}

#[async_trait::async_trait]
impl InsightProvider for ChatCompletionsProvider {
    async fn generate_insights(&self, summary: &JsonValue) -> AppResult<InsightReport> {
        let ChatInvocationResult {
            content,
            tokens_used,
            latency_ms,
            correlation_id,
        } = self.invoke_chat(summary).await?;

        let mut report: InsightReport = serde_json::from_value(content).map_err(|err| {
            AppError::ai_with_details(
                AiErrorCode::InvalidResponse,
                format!("provider insights do not match the expected shape: {err}"),
                Some(correlation_id.as_str()),
                None,
            )
        })?;

        if report.headline.trim().is_empty() && report.highlights.is_empty() {
            return Err(AppError::ai_with_details(
                AiErrorCode::InvalidResponse,
                "provider returned empty insights",
                Some(correlation_id.as_str()),
                Some(json!({ "reason": "empty_insights" })),
            ));
        }

        report.provider = Some(self.build_provider_metadata(tokens_used, latency_ms, &correlation_id));
        report.generated_at = Utc::now().to_rfc3339();
        report.source = AiResponseSource::Online;
        Ok(report)
    }

    async fn ping(&self) -> AppResult<AiProviderMetadata> {
        let url = format!("{}/v1/models", self.base_url);
        let correlation_id = Uuid::new_v4().to_string();
        let start = Instant::now();

        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) if resp.status().is_success() => Ok(self.build_provider_metadata(
                HashMap::new(),
                start.elapsed().as_millis(),
                &correlation_id,
            )),
            Ok(resp) => {
                let (error, _) = map_http_error(resp.status(), &correlation_id);
                Err(error)
            }
            Err(err) => {
                let (error, _) = error_from_reqwest(err, &correlation_id);
                Err(error)
            }
        }
    }
}

/// Strips an optional markdown fence and parses the message content as JSON.
fn parse_content(content: &str, correlation_id: &str) -> AppResult<JsonValue> {
    let trimmed = content.trim();
    let cleaned = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(cleaned).map_err(|err| {
        AppError::ai_with_details(
            AiErrorCode::InvalidResponse,
            format!("provider content is not JSON: {err}"),
            Some(correlation_id),
            Some(json!({ "reason": "invalid_json" })),
        )
    })
}

fn extract_tokens(body: &JsonValue) -> HashMap<String, u64> {
    let Some(usage) = body.get("usage") else {
        return HashMap::new();
    };
    [
        ("prompt", "prompt_tokens"),
        ("completion", "completion_tokens"),
        ("total", "total_tokens"),
    ]
    .into_iter()
    .filter_map(|(name, field)| {
        usage
            .get(field)
            .and_then(JsonValue::as_u64)
            .map(|value| (name.to_string(), value))
    })
    .collect()
}

/// Maps a non-success status to an error and whether it is worth retrying.
fn map_http_error(status: StatusCode, correlation_id: &str) -> (AppError, bool) {
    let (code, message, retryable) = match status {
        StatusCode::UNAUTHORIZED => (
            AiErrorCode::MissingApiKey,
            "insight provider rejected the API key".to_string(),
            false,
        ),
        StatusCode::FORBIDDEN => (
            AiErrorCode::Forbidden,
            "insight provider denied access".to_string(),
            false,
        ),
        StatusCode::TOO_MANY_REQUESTS => (
            AiErrorCode::RateLimited,
            "insight provider rate limit reached".to_string(),
            true,
        ),
        status if status.is_server_error() => (
            AiErrorCode::ProviderUnavailable,
            format!("insight provider unavailable (status {})", status.as_u16()),
            true,
        ),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => (
            AiErrorCode::InvalidRequest,
            format!("insight provider rejected the request (status {})", status.as_u16()),
            false,
        ),
        status => (
            AiErrorCode::Unknown,
            format!("insight provider returned status {}", status.as_u16()),
            false,
        ),
    };
    (
        AppError::ai_with_details(code, message, Some(correlation_id), None),
        retryable,
    )
}

fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> (AppError, bool) {
    if err.is_timeout() {
        (
            AppError::ai_with_details(
                AiErrorCode::HttpTimeout,
                "insight provider request timed out",
                Some(correlation_id),
                None,
            ),
            true,
        )
    } else if err.is_connect() {
        (
            AppError::ai_with_details(
                AiErrorCode::ProviderUnavailable,
                "could not connect to the insight provider",
                Some(correlation_id),
                None,
            ),
            true,
        )
    } else if let Some(status) = err.status() {
        map_http_error(status, correlation_id)
    } else {
        (
            AppError::ai_with_details(
                AiErrorCode::Unknown,
                format!("insight provider request failed: {err}"),
                Some(correlation_id),
                None,
            ),
            false,
        )
    }
}

pub mod testing {
    use super::*;

    /// Exposes the status mapping to integration tests.
    pub fn map_http_error(status: StatusCode) -> (AppError, bool) {
        super::map_http_error(status, "test-correlation-id")
    }

    /// A provider against `base_url` that retries without sleeping.
    pub fn provider_for(base_url: &str, timeout: StdDuration) -> AppResult<ChatCompletionsProvider> {
        let config = AiConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            model: "deepseek-chat".to_string(),
            http_timeout: timeout,
        };
        Ok(ChatCompletionsProvider::try_new(&config, "test-key".to_string())?
            .with_backoff(vec![StdDuration::ZERO; DEFAULT_BACKOFF_SECS.len()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::dashboard::DashboardSummary;
    use crate::models::funnel::MetricsSnapshot;

    struct StubProvider {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl InsightProvider for StubProvider {
        async fn generate_insights(&self, summary: &JsonValue) -> AppResult<InsightReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let total = summary["context"]["summary"]["totalLeads"].as_u64().unwrap_or(0);
            Ok(InsightReport {
                headline: format!("{total} leads this period"),
                highlights: vec!["Qualification is the weakest step".to_string()],
                ..InsightReport::default()
            })
        }

        async fn ping(&self) -> AppResult<AiProviderMetadata> {
            Ok(AiProviderMetadata {
                provider_id: Some("stub".to_string()),
                latency_ms: Some(3),
                ..AiProviderMetadata::default()
            })
        }
    }

    fn response(total_leads: u64) -> DashboardResponse {
        DashboardResponse {
            source_identity: "memory:test".to_string(),
            generated_at: Utc::now().to_rfc3339(),
            fetched_at: Utc::now().to_rfc3339(),
            from_cache: false,
            summary: DashboardSummary {
                total_leads,
                qualified_leads: 45,
                closed_sales: 8,
                qualification_rate: 30.0,
                close_rate: 5.33,
                quality_score: 1.6,
            },
            snapshot: MetricsSnapshot::from_counts([total_leads, 45, 30, 25, 15, 10, 8]),
            funnel: None,
            bottlenecks: None,
            projection: None,
            temperature: None,
            targets: None,
            pipeline_health: None,
            trends: None,
            engagement: None,
            lead_tracker: None,
            sections: Vec::new(),
            issues: Vec::new(),
            insights: Vec::new(),
        }
    }

    #[tokio::test]
    async fn missing_key_surfaces_missing_api_key() {
        let service = AiService::new(AiConfig::default()).expect("service");
        let error = service
            .generate_insights(&response(150))
            .await
            .expect_err("no key");
        assert_eq!(error.ai_code(), Some(AiErrorCode::MissingApiKey));

        let status = service.status().await.expect("status");
        assert!(!status.has_api_key);
        assert_eq!(status.mode, AiResponseSource::Offline);
    }

    #[tokio::test]
    async fn equal_summaries_are_served_from_cache() {
        let stub = Arc::new(StubProvider {
            calls: AtomicUsize::new(0),
        });
        let service = AiService::with_provider(AiConfig::default(), stub.clone());

        let first = service.generate_insights(&response(150)).await.expect("first");
        assert_eq!(first.source, AiResponseSource::Online);
        assert_eq!(first.headline, "150 leads this period");

        let second = service.generate_insights(&response(150)).await.expect("second");
        assert_eq!(second.source, AiResponseSource::Cache);
        assert_eq!(second.headline, first.headline);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        service.generate_insights(&response(151)).await.expect("third");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);

        assert_eq!(service.clear_cache(), 2);
    }

    #[tokio::test]
    async fn status_reports_provider_latency() {
        let stub = Arc::new(StubProvider {
            calls: AtomicUsize::new(0),
        });
        let service = AiService::with_provider(AiConfig::default(), stub);
        let status = service.status().await.expect("status");
        assert!(status.has_api_key);
        assert_eq!(status.latency_ms, Some(3));
    }

    #[test]
    fn parse_content_strips_code_fences() {
        let fenced = "```json\n{\"headline\":\"Up\",\"highlights\":[]}\n```";
        let value = parse_content(fenced, "id").expect("fenced json");
        assert_eq!(value["headline"], "Up");

        let error = parse_content("not json", "id").expect_err("invalid");
        assert_eq!(error.ai_code(), Some(AiErrorCode::InvalidResponse));
    }

    #[test]
    fn extract_tokens_reads_usage_block() {
        let body = json!({ "usage": { "prompt_tokens": 120, "completion_tokens": 40 } });
        let tokens = extract_tokens(&body);
        assert_eq!(tokens.get("prompt"), Some(&120));
        assert_eq!(tokens.get("completion"), Some(&40));
        assert!(!tokens.contains_key("total"));
        assert!(extract_tokens(&json!({})).is_empty());
    }

    #[test]
    fn retryable_statuses() {
        assert!(map_http_error(StatusCode::TOO_MANY_REQUESTS, "id").1);
        assert!(map_http_error(StatusCode::BAD_GATEWAY, "id").1);
        assert!(!map_http_error(StatusCode::UNAUTHORIZED, "id").1);
        assert_eq!(
            map_http_error(StatusCode::FORBIDDEN, "id").0.ai_code(),
            Some(AiErrorCode::Forbidden)
        );
    }
}
