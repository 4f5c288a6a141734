use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::models::dashboard::DashboardResponse;

/// System prompt for turning a funnel summary into prose insights.
pub fn insights_system_prompt() -> &'static str {
    r#"You are a sales analyst for a real-estate lead generation campaign. You receive a JSON
summary of the sales funnel: stage counts, conversion rates, the ranked bottlenecks, lead
temperature, projections and, when available, recent trend and engagement figures.
Respond with valid UTF-8 JSON only, without markdown code fences, using the schema:
{
  "headline": string,
  "highlights": string[],
  "recommendations": string[]
}
Keep the headline under 100 characters. Return at most four highlights and at most four
recommendations. Quote figures from the summary exactly; do not invent numbers."#
}

/// Builds the user payload for insight generation. Timestamps are left out
/// so equal funnels hash to the same cache entry.
pub fn build_insights_payload(response: &DashboardResponse) -> JsonValue {
    let mut context = JsonMap::new();
    context.insert("summary".to_string(), json!(response.summary));
    context.insert("snapshot".to_string(), json!(response.snapshot));

    if let Some(funnel) = &response.funnel {
        context.insert("funnel".to_string(), json!(funnel));
    }
    if let Some(bottlenecks) = &response.bottlenecks {
        context.insert("bottlenecks".to_string(), json!(bottlenecks));
    }
    if let Some(temperature) = &response.temperature {
        context.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(projection) = &response.projection {
        context.insert("projection".to_string(), json!(projection));
    }
    if let Some(health) = &response.pipeline_health {
        context.insert("pipelineHealth".to_string(), json!(health));
    }
    if let Some(comparison) = response
        .trends
        .as_ref()
        .and_then(|trends| trends.comparison.as_ref())
    {
        context.insert("trend".to_string(), json!(comparison));
    }
    if let Some(engagement) = &response.engagement {
        context.insert(
            "engagement".to_string(),
            json!({
                "totals": engagement.totals,
                "positiveRate": engagement.positive_rate,
                "schedulingRate": engagement.scheduling_rate,
            }),
        );
    }
    if let Some(tracker) = &response.lead_tracker {
        let sources: Vec<JsonValue> = tracker
            .sources
            .iter()
            .map(|row| {
                json!({
                    "source": row.name,
                    "leads": row.leads,
                    "qualified": row.qualified,
                    "won": row.won,
                    "winRate": row.win_rate,
                })
            })
            .collect();
        // Agent `name` fields are masked by redaction.
        context.insert(
            "leadTracker".to_string(),
            json!({
                "summary": tracker.summary,
                "sources": sources,
                "agents": tracker.agents,
            }),
        );
    }

    json!({
        "operation": "generateInsights",
        "context": JsonValue::Object(context),
        "expectations": {
            "maxHighlights": 4,
            "maxRecommendations": 4,
            "language": "en"
        }
    })
}
