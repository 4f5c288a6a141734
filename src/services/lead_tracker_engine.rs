use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::leads::{
    FollowUp, GroupPerformance, LeadRecord, LeadStage, LeadSummary, LeadTrackerView, StageShare,
};
use crate::services::metrics_engine::percentage;

pub const UNASSIGNED_AGENT: &str = "Unassigned";
const TOP_CAMPAIGN_LIMIT: usize = 5;

pub fn summary_stats(leads: &[LeadRecord]) -> LeadSummary {
    let total = leads.len() as u64;
    let qualified = count_where(leads, |lead| lead.stage.is_qualified());
    let won = count_where(leads, |lead| lead.stage.is_won());
    let lost = count_where(leads, |lead| lead.stage.is_lost());

    LeadSummary {
        total,
        qualified,
        won,
        lost,
        win_rate: percentage(won, total),
        active: total - won - lost,
    }
}

/// Every known stage in order; an `Other` share follows only when present.
pub fn stage_distribution(leads: &[LeadRecord]) -> Vec<StageShare> {
    let total = leads.len() as u64;
    let share = |stage: LeadStage| {
        let count = count_where(leads, |lead| lead.stage == stage);
        StageShare {
            stage,
            count,
            percentage: percentage(count, total),
        }
    };

    let mut shares: Vec<StageShare> = LeadStage::ALL.into_iter().map(share).collect();
    let other = share(LeadStage::Other);
    if other.count > 0 {
        shares.push(other);
    }
    shares
}

/// Per-source table sorted by lead volume.
pub fn source_performance(leads: &[LeadRecord]) -> Vec<GroupPerformance> {
    let mut rows = group_performance(leads.iter(), |lead| lead.source.as_str());
    sort_by_leads(&mut rows);
    rows
}

/// Agents ranked by won deals. Blank and unassigned owners are left out.
pub fn agent_leaderboard(leads: &[LeadRecord]) -> Vec<GroupPerformance> {
    let assigned = leads.iter().filter(|lead| is_assigned(&lead.agent));
    let mut rows = group_performance(assigned, |lead| lead.agent.as_str());
    rows.sort_by(|left, right| {
        right
            .won
            .cmp(&left.won)
            .then_with(|| right.leads.cmp(&left.leads))
            .then_with(|| left.name.cmp(&right.name))
    });
    rows
}

pub fn top_campaigns(leads: &[LeadRecord]) -> Vec<GroupPerformance> {
    let named = leads.iter().filter(|lead| !lead.campaign.trim().is_empty());
    let mut rows = group_performance(named, |lead| lead.campaign.as_str());
    sort_by_leads(&mut rows);
    rows.truncate(TOP_CAMPAIGN_LIMIT);
    rows
}

/// Open leads whose next follow-up falls on or before `date`, earliest first.
/// When `agent` is set only that agent's leads are listed.
pub fn follow_ups_due(leads: &[LeadRecord], agent: Option<&str>, date: NaiveDate) -> Vec<FollowUp> {
    let mut due: Vec<FollowUp> = leads
        .iter()
        .filter(|lead| lead.stage.is_active())
        .filter(|lead| match agent {
            Some(name) => lead.agent.trim().eq_ignore_ascii_case(name.trim()),
            None => true,
        })
        .filter_map(|lead| {
            let next = lead.next_follow_up?;
            (next <= date).then(|| FollowUp {
                lead_id: lead.lead_id.clone(),
                name: lead.full_name(),
                stage: lead.stage,
                agent: lead.agent.clone(),
                due: next,
                overdue: next < date,
            })
        })
        .collect();
    due.sort_by(|left, right| left.due.cmp(&right.due).then_with(|| left.lead_id.cmp(&right.lead_id)));
    due
}

pub fn tracker_view(leads: &[LeadRecord], agent: Option<&str>, today: NaiveDate) -> LeadTrackerView {
    LeadTrackerView {
        summary: summary_stats(leads),
        stages: stage_distribution(leads),
        sources: source_performance(leads),
        agents: agent_leaderboard(leads),
        campaigns: top_campaigns(leads),
        follow_ups: follow_ups_due(leads, agent, today),
    }
}

fn is_assigned(agent: &str) -> bool {
    let trimmed = agent.trim();
    !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(UNASSIGNED_AGENT)
}

fn count_where(leads: &[LeadRecord], predicate: impl Fn(&LeadRecord) -> bool) -> u64 {
    leads.iter().filter(|lead| predicate(*lead)).count() as u64
}

fn group_performance<'a>(
    leads: impl Iterator<Item = &'a LeadRecord>,
    key: impl Fn(&LeadRecord) -> &str,
) -> Vec<GroupPerformance> {
    let mut grouped: HashMap<String, (u64, u64, u64)> = HashMap::new();
    for lead in leads {
        let entry = grouped.entry(key(lead).trim().to_string()).or_default();
        entry.0 += 1;
        if lead.stage.is_qualified() {
            entry.1 += 1;
        }
        if lead.stage.is_won() {
            entry.2 += 1;
        }
    }

    grouped
        .into_iter()
        .map(|(name, (total, qualified, won))| GroupPerformance {
            name,
            leads: total,
            qualified,
            won,
            qualification_rate: round_one(percentage(qualified, total)),
            win_rate: round_one(percentage(won, total)),
        })
        .collect()
}

fn sort_by_leads(rows: &mut [GroupPerformance]) {
    rows.sort_by(|left, right| {
        right
            .leads
            .cmp(&left.leads)
            .then_with(|| left.name.cmp(&right.name))
    });
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
