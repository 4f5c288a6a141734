use crate::models::funnel::MetricsSnapshot;
use crate::models::pipeline::{HealthLevel, PipelineHealth, StageTargets, TargetProgress};
use crate::services::metrics_engine::{critical_bottleneck, percentage};

const CRITICAL_RATE_THRESHOLD: f64 = 25.0;
const WARNING_RATE_THRESHOLD: f64 = 50.0;

pub fn target_progress(snapshot: &MetricsSnapshot, targets: &StageTargets) -> Vec<TargetProgress> {
    targets
        .entries()
        .into_iter()
        .map(|(stage, target)| {
            let actual = snapshot.get(stage);
            let percent_complete = if target == 0 {
                100.0
            } else {
                percentage(actual, target)
            };
            TargetProgress {
                stage,
                actual,
                target,
                percent_complete,
                remaining: target.saturating_sub(actual),
                achieved: actual >= target,
            }
        })
        .collect()
}

/// Health level follows the critical bottleneck: below 25% is critical,
/// below 50% a warning.
pub fn pipeline_health(snapshot: &MetricsSnapshot) -> PipelineHealth {
    let critical = critical_bottleneck(snapshot);
    let level = match critical.as_ref().map(|entry| entry.rate) {
        Some(rate) if rate < CRITICAL_RATE_THRESHOLD => HealthLevel::Critical,
        Some(rate) if rate < WARNING_RATE_THRESHOLD => HealthLevel::Warning,
        _ => HealthLevel::Ok,
    };

    PipelineHealth {
        active_pipeline: snapshot
            .qualified_leads()
            .saturating_sub(snapshot.closed_sales()),
        viewing_show_rate: percentage(snapshot.viewings_completed(), snapshot.viewings_scheduled()),
        offer_acceptance_rate: percentage(snapshot.offers_accepted(), snapshot.offers_made()),
        critical_label: critical.as_ref().map(|entry| entry.label.clone()),
        critical_rate: critical.as_ref().map(|entry| entry.rate),
        level,
    }
}
