use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const LEAD_TRACKER_WORKSHEET: &str = "Lead Tracker";

/// Stages used by the per-lead tracker sheet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeadStage {
    #[serde(rename = "Lead Collected")]
    LeadCollected,
    #[serde(rename = "Contact Attempted")]
    ContactAttempted,
    #[serde(rename = "Contact Made")]
    ContactMade,
    #[serde(rename = "Qualified Lead")]
    QualifiedLead,
    #[serde(rename = "Discovery/Presentation")]
    DiscoveryPresentation,
    #[serde(rename = "Opportunity")]
    Opportunity,
    #[serde(rename = "Negotiation")]
    Negotiation,
    #[serde(rename = "Contract Signed")]
    ContractSigned,
    #[serde(rename = "Lost")]
    Lost,
    /// Any label outside the known tracker stages. Counted as an open lead.
    #[serde(rename = "Other")]
    Other,
}

impl LeadStage {
    /// Tracker stages in pipeline order, `Lost` last.
    pub const ALL: [LeadStage; 9] = [
        LeadStage::LeadCollected,
        LeadStage::ContactAttempted,
        LeadStage::ContactMade,
        LeadStage::QualifiedLead,
        LeadStage::DiscoveryPresentation,
        LeadStage::Opportunity,
        LeadStage::Negotiation,
        LeadStage::ContractSigned,
        LeadStage::Lost,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LeadStage::LeadCollected => "Lead Collected",
            LeadStage::ContactAttempted => "Contact Attempted",
            LeadStage::ContactMade => "Contact Made",
            LeadStage::QualifiedLead => "Qualified Lead",
            LeadStage::DiscoveryPresentation => "Discovery/Presentation",
            LeadStage::Opportunity => "Opportunity",
            LeadStage::Negotiation => "Negotiation",
            LeadStage::ContractSigned => "Contract Signed",
            LeadStage::Lost => "Lost",
            LeadStage::Other => "Other",
        }
    }

    /// Known tracker stage for `label`; `Other` is never matched by name.
    pub fn from_label(label: &str) -> Option<LeadStage> {
        let trimmed = label.trim();
        LeadStage::ALL
            .into_iter()
            .find(|stage| stage.label().eq_ignore_ascii_case(trimmed))
    }

    /// Qualified Lead through Contract Signed.
    pub fn is_qualified(self) -> bool {
        (LeadStage::QualifiedLead..=LeadStage::ContractSigned).contains(&self)
    }

    pub fn is_won(self) -> bool {
        self == LeadStage::ContractSigned
    }

    pub fn is_lost(self) -> bool {
        self == LeadStage::Lost
    }

    pub fn is_active(self) -> bool {
        !self.is_won() && !self.is_lost()
    }
}

impl fmt::Display for LeadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub lead_id: String,
    pub first_name: String,
    pub last_name: String,
    pub stage: LeadStage,
    pub source: String,
    pub agent: String,
    pub campaign: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_collected: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_follow_up: Option<NaiveDate>,
}

impl LeadRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummary {
    pub total: u64,
    pub qualified: u64,
    pub won: u64,
    pub lost: u64,
    pub win_rate: f64,
    pub active: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageShare {
    pub stage: LeadStage,
    pub count: u64,
    pub percentage: f64,
}

/// One row of a grouped table (per source, agent or campaign).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPerformance {
    pub name: String,
    pub leads: u64,
    pub qualified: u64,
    pub won: u64,
    pub qualification_rate: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub lead_id: String,
    pub name: String,
    pub stage: LeadStage,
    pub agent: String,
    pub due: NaiveDate,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadTrackerView {
    pub summary: LeadSummary,
    pub stages: Vec<StageShare>,
    pub sources: Vec<GroupPerformance>,
    pub agents: Vec<GroupPerformance>,
    pub campaigns: Vec<GroupPerformance>,
    pub follow_ups: Vec<FollowUp>,
}
