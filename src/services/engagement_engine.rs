use crate::models::series::{EngagementCounts, EngagementPoint, EngagementSeries, EngagementSummary};
use crate::services::metrics_engine::percentage;

/// Totals and conversation rates for the WhatsApp funnel.
///
/// Sentiment and relevance rates are relative to messages answered; the
/// scheduling rate is scheduled leads over relevant conversations.
pub fn engagement_summary(series: &EngagementSeries) -> EngagementSummary {
    let totals = series
        .rows()
        .iter()
        .fold(EngagementCounts::default(), |acc, row| acc.combined(&row.counts));

    let points = series
        .rows()
        .iter()
        .map(|row| EngagementPoint {
            date: row.date,
            messages_answered: row.counts.messages_answered,
            positive_rate: percentage(row.counts.positive, row.counts.messages_answered),
            scheduled_leads: row.counts.scheduled_leads,
        })
        .collect();

    EngagementSummary {
        totals,
        positive_rate: percentage(totals.positive, totals.messages_answered),
        negative_rate: percentage(totals.negative, totals.messages_answered),
        relevance_rate: percentage(totals.relevant, totals.messages_answered),
        scheduling_rate: percentage(totals.scheduled_leads, totals.relevant),
        points,
    }
}
