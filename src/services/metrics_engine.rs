use std::collections::HashSet;

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::funnel::{
    Bottleneck, DataIssue, DataIssueKind, FunnelRates, MetricsSnapshot, ProjectedStage,
    Projection, Stage, StageCount, StageRate, StageTransition, TemperatureBreakdown,
    WhatIfScenario, METRICS_WORKSHEET,
};

pub const DEFAULT_HORIZON: u64 = 100;
const WHAT_IF_UPLIFT: f64 = 1.1;

const BOTTLENECK_PAIRS: [(&str, Stage, Stage); 5] = [
    ("Lead → Qualified", Stage::TotalLeads, Stage::QualifiedLeads),
    (
        "Qualified → Viewing",
        Stage::QualifiedLeads,
        Stage::ViewingsCompleted,
    ),
    ("Viewing → Offer", Stage::ViewingsCompleted, Stage::OffersMade),
    ("Offer → Accepted", Stage::OffersMade, Stage::OffersAccepted),
    ("Accepted → Closed", Stage::OffersAccepted, Stage::ClosedSales),
];

/// Parses a count cell. Blank cells are 0; thousands separators are accepted.
pub fn parse_count(raw: &str) -> Result<u64, &'static str> {
    let cleaned: String = raw.trim().chars().filter(|ch| *ch != ',').collect();
    if cleaned.is_empty() {
        return Ok(0);
    }

    if let Ok(value) = cleaned.parse::<u64>() {
        return Ok(value);
    }
    if let Ok(value) = cleaned.parse::<i64>() {
        if value < 0 {
            return Err("count is negative");
        }
    }

    match cleaned.parse::<f64>() {
        Ok(value) if !value.is_finite() => Err("count is not a finite number"),
        Ok(value) if value < 0.0 => Err("count is negative"),
        Ok(value) if value.fract() != 0.0 => Err("count is fractional"),
        Ok(value) if value > u64::MAX as f64 => Err("count is out of range"),
        Ok(value) => Ok(value as u64),
        Err(_) => Err("count is not a number"),
    }
}

/// Builds a snapshot from raw stage rows, failing on the first malformed count.
///
/// Every canonical stage starts at 0. Rows with labels outside the canonical
/// set are ignored and a repeated label overwrites the earlier value.
pub fn compute_snapshot(rows: &[StageCount]) -> AppResult<MetricsSnapshot> {
    let mut snapshot = MetricsSnapshot::default();
    for (index, row) in rows.iter().enumerate() {
        let Some(stage) = Stage::from_label(&row.stage) else {
            continue;
        };
        let count = parse_count(&row.count).map_err(|reason| {
            AppError::malformed_input(
                METRICS_WORKSHEET,
                row_number(index, row),
                row.count.clone(),
                reason,
            )
        })?;
        snapshot = snapshot.with_stage(stage, count);
    }
    Ok(snapshot)
}

/// Lenient variant of [`compute_snapshot`]: malformed rows are excluded and
/// reported alongside unknown and repeated stage labels.
pub fn compute_snapshot_with_issues(rows: &[StageCount]) -> (MetricsSnapshot, Vec<DataIssue>) {
    let mut snapshot = MetricsSnapshot::default();
    let mut issues = Vec::new();
    let mut seen: HashSet<Stage> = HashSet::new();

    for (index, row) in rows.iter().enumerate() {
        let row_no = row_number(index, row);
        let Some(stage) = Stage::from_label(&row.stage) else {
            issues.push(DataIssue::new(
                METRICS_WORKSHEET,
                row_no,
                Some("Stage"),
                DataIssueKind::UnknownStage,
                format!("unknown stage '{}' ignored", row.stage.trim()),
            ));
            continue;
        };

        match parse_count(&row.count) {
            Ok(count) => {
                if !seen.insert(stage) {
                    issues.push(DataIssue::new(
                        METRICS_WORKSHEET,
                        row_no,
                        Some("Stage"),
                        DataIssueKind::DuplicateStage,
                        format!("stage '{}' repeated; later row wins", stage),
                    ));
                }
                snapshot = snapshot.with_stage(stage, count);
            }
            Err(reason) => {
                issues.push(DataIssue::new(
                    METRICS_WORKSHEET,
                    row_no,
                    Some("Count"),
                    DataIssueKind::MalformedValue,
                    format!("'{}' for {}: {}", row.count.trim(), stage, reason),
                ));
            }
        }
    }

    if !issues.is_empty() {
        debug!(target: "app::engine", issues = issues.len(), "metrics rows flagged");
    }
    (snapshot, issues)
}

pub fn funnel_rates(snapshot: &MetricsSnapshot) -> FunnelRates {
    let transitions = Stage::ALL
        .windows(2)
        .map(|pair| StageTransition {
            from: pair[0],
            to: pair[1],
            rate: percentage(snapshot.get(pair[1]), snapshot.get(pair[0])),
        })
        .collect();

    let total = snapshot.total_leads();
    let lead_rates = snapshot
        .iter()
        .map(|(stage, count)| StageRate {
            stage,
            count,
            rate: percentage(count, total),
        })
        .collect();

    FunnelRates {
        transitions,
        lead_rates,
        overall_close_rate: percentage(snapshot.closed_sales(), total),
    }
}

/// Conversion between key stage pairs, ascending by rate. Pairs with an
/// empty source stage are left out; equal rates keep funnel order.
pub fn bottlenecks(snapshot: &MetricsSnapshot) -> Vec<Bottleneck> {
    let mut ranked: Vec<Bottleneck> = BOTTLENECK_PAIRS
        .iter()
        .filter(|(_, from, _)| snapshot.get(*from) > 0)
        .map(|(label, from, to)| {
            let from_count = snapshot.get(*from);
            let to_count = snapshot.get(*to);
            Bottleneck {
                label: (*label).to_string(),
                from_stage: *from,
                to_stage: *to,
                rate: percentage(to_count, from_count),
                drop_off: from_count.saturating_sub(to_count),
                from_count,
                to_count,
            }
        })
        .collect();

    ranked.sort_by(|left, right| left.rate.total_cmp(&right.rate));
    ranked
}

pub fn critical_bottleneck(snapshot: &MetricsSnapshot) -> Option<Bottleneck> {
    bottlenecks(snapshot).into_iter().next()
}

/// Expected stage counts for `horizon` new leads at the current top-of-funnel
/// rates, plus closed-sales what-ifs for a 10% relative uplift.
pub fn projections(snapshot: &MetricsSnapshot, horizon: u64) -> Projection {
    let total = snapshot.total_leads();
    let stages: Vec<ProjectedStage> = snapshot
        .iter()
        .map(|(stage, count)| ProjectedStage {
            stage,
            rate: ratio(count, total),
            projected: project(horizon, count, total),
        })
        .collect();

    let baseline_closed = project(horizon, snapshot.closed_sales(), total);

    Projection {
        horizon,
        stages,
        baseline_closed,
        improved_qualification: what_if(snapshot, Stage::QualifiedLeads, horizon, baseline_closed),
        improved_viewing: what_if(snapshot, Stage::ViewingsCompleted, horizon, baseline_closed),
    }
}

pub fn lead_temperature(snapshot: &MetricsSnapshot) -> TemperatureBreakdown {
    let total = snapshot.total_leads();

    let hot = snapshot
        .viewings_completed()
        .min(snapshot.offers_made().saturating_add(snapshot.offers_accepted()))
        .min(total);
    let warm = snapshot
        .qualified_leads()
        .min(
            snapshot
                .viewings_scheduled()
                .saturating_add(snapshot.viewings_completed()),
        )
        .saturating_sub(hot)
        .min(total - hot);
    let cold = total - hot - warm;

    let quality_score = if total == 0 {
        0.0
    } else {
        let weighted = (hot as f64) * 3.0 + (warm as f64) * 2.0 + cold as f64;
        weighted / total as f64
    };

    TemperatureBreakdown {
        hot,
        warm,
        cold,
        hot_pct: percentage(hot, total),
        warm_pct: percentage(warm, total),
        cold_pct: percentage(cold, total),
        hot_to_close_rate: percentage(snapshot.closed_sales(), hot),
        warm_to_hot_rate: percentage(hot, warm),
        cold_to_warm_rate: percentage(warm, cold),
        quality_score,
    }
}

pub(crate) fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    percentage(numerator, denominator) / 100.0
}

fn project(horizon: u64, count: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    let projected = u128::from(horizon) * u128::from(count) / u128::from(total);
    u64::try_from(projected).unwrap_or(u64::MAX)
}

fn what_if(
    snapshot: &MetricsSnapshot,
    stage: Stage,
    horizon: u64,
    baseline_closed: u64,
) -> WhatIfScenario {
    let stage_count = snapshot.get(stage);
    let current_rate = ratio(stage_count, snapshot.total_leads());
    let improved_rate = (current_rate * WHAT_IF_UPLIFT).min(1.0);

    // closeRate / stageRate reduces to closed / stageCount.
    let projected_closed = if current_rate <= 0.0 {
        0
    } else {
        let downstream = snapshot.closed_sales() as f64 / stage_count as f64;
        (horizon as f64 * improved_rate * downstream).trunc() as u64
    };

    WhatIfScenario {
        improved_stage: stage,
        current_rate,
        improved_rate,
        projected_closed,
        delta: projected_closed as i64 - baseline_closed as i64,
    }
}

fn row_number(index: usize, row: &StageCount) -> usize {
    if row.row > 0 {
        row.row
    } else {
        index + 2
    }
}
