//! Core domain types for LeadDesk: leads, collaborators, groups, and the
//! per-group distribution settings.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::error::{LeadDeskError, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new time-sortable identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Identifier of an ingested lead (UUID v7).
    LeadId
);
uuid_id!(
    /// Identifier of a collaborator who works leads.
    CollaboratorId
);
uuid_id!(
    /// Identifier of a collaborator group.
    GroupId
);

// ---------------------------------------------------------------------------
// LeadTier / TierFilter
// ---------------------------------------------------------------------------

/// Qualification tier assigned to a lead by the scoring step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTier {
    Low,
    Medium,
    High,
}

impl LeadTier {
    /// Storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Business label shown to sales teams.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Bas de gamme",
            Self::Medium => "Moyen de gamme",
            Self::High => "Haut de gamme",
        }
    }

    /// Map a 0–100 qualification score onto a tier.
    pub fn from_score(score: u8, thresholds: &ScoringConfig) -> Self {
        if score >= thresholds.high_threshold {
            Self::High
        } else if score >= thresholds.medium_threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for LeadTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadTier {
    type Err = LeadDeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" | "bas de gamme" => Ok(Self::Low),
            "medium" | "moyen de gamme" => Ok(Self::Medium),
            "high" | "haut de gamme" => Ok(Self::High),
            other => Err(LeadDeskError::validation(format!(
                "unknown lead tier '{other}': expected low, medium, or high"
            ))),
        }
    }
}

/// Which lead tiers a group receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierFilter {
    /// Every lead, including ones not scored yet.
    #[default]
    All,
    /// Only leads of this tier.
    Only(LeadTier),
}

impl TierFilter {
    /// Whether a lead with the given tier passes this filter.
    pub fn matches(&self, tier: Option<LeadTier>) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => tier == Some(*wanted),
        }
    }

    /// Storage key: `all` or the tier key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(tier) => tier.as_str(),
        }
    }
}

impl std::fmt::Display for TierFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TierFilter {
    type Err = LeadDeskError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        Ok(Self::Only(s.parse()?))
    }
}

// ---------------------------------------------------------------------------
// LeadStatus
// ---------------------------------------------------------------------------

/// Pipeline status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Ingested, waiting for distribution.
    #[default]
    Pending,
    /// Freshly assigned to a collaborator.
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl LeadStatus {
    /// Storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Converted => "converted",
            Self::Lost => "lost",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = LeadDeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "new" => Ok(Self::New),
            "contacted" => Ok(Self::Contacted),
            "qualified" => Ok(Self::Qualified),
            "converted" => Ok(Self::Converted),
            "lost" => Ok(Self::Lost),
            other => Err(LeadDeskError::validation(format!(
                "unknown lead status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// A prospect waiting to be worked by a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    /// Contact or company name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Where the lead came from (form, import, partner...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Qualification score (0–100) from the external scorer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    /// Qualification tier. `None` until the lead has been scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<LeadTier>,
    pub status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_collaborator_id: Option<CollaboratorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// A fresh, unassigned lead.
    pub fn new(name: impl Into<String>, tier: Option<LeadTier>) -> Self {
        Self {
            id: LeadId::new(),
            name: name.into(),
            email: None,
            phone: None,
            source: None,
            score: None,
            tier,
            status: LeadStatus::Pending,
            assigned_collaborator_id: None,
            assigned_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_collaborator_id.is_some()
    }

    /// Check intake fields before the lead is stored.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LeadDeskError::validation("lead name must not be empty"));
        }
        if let Some(email) = &self.email {
            if !EMAIL_RE.is_match(email) {
                return Err(LeadDeskError::validation(format!(
                    "invalid email address '{email}'"
                )));
            }
        }
        if let Some(score) = self.score {
            if score > 100 {
                return Err(LeadDeskError::validation(format!(
                    "score {score} is out of range 0-100"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collaborator / Group / DistributionSetting
// ---------------------------------------------------------------------------

/// A salesperson who receives leads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: CollaboratorId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A team of collaborators sharing one daily quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Members in a stable order; the order only breaks ties.
    pub member_ids: Vec<CollaboratorId>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Members with duplicates removed, first occurrence kept.
    pub fn unique_members(&self) -> Vec<&CollaboratorId> {
        let mut seen = std::collections::HashSet::new();
        self.member_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Distribution rules attached one-to-one to a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSetting {
    pub group_id: GroupId,
    /// Maximum number of leads the whole group receives per day.
    pub daily_quota: u32,
    pub lead_tier: TierFilter,
    pub updated_at: DateTime<Utc>,
}

/// One lead handed to one collaborator. Drives the batch update; never
/// stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentAction {
    pub lead_id: LeadId,
    pub collaborator_id: CollaboratorId,
}

/// Leads already assigned today, per collaborator.
pub type AssignmentCounts = HashMap<CollaboratorId, i64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_roundtrip() {
        let id = LeadId::new();
        let parsed: LeadId = id.to_string().parse().expect("parse LeadId");
        assert_eq!(id, parsed);

        let group = GroupId::new();
        let parsed: GroupId = group.to_string().parse().expect("parse GroupId");
        assert_eq!(group, parsed);
    }

    #[test]
    fn tier_parses_keys_and_labels() {
        assert_eq!("high".parse::<LeadTier>().unwrap(), LeadTier::High);
        assert_eq!("Haut de gamme".parse::<LeadTier>().unwrap(), LeadTier::High);
        assert_eq!("moyen de gamme".parse::<LeadTier>().unwrap(), LeadTier::Medium);
        assert!("premium".parse::<LeadTier>().is_err());
    }

    #[test]
    fn tier_from_score_uses_thresholds() {
        let scoring = ScoringConfig::default();
        assert_eq!(LeadTier::from_score(95, &scoring), LeadTier::High);
        assert_eq!(LeadTier::from_score(scoring.high_threshold, &scoring), LeadTier::High);
        assert_eq!(LeadTier::from_score(50, &scoring), LeadTier::Medium);
        assert_eq!(LeadTier::from_score(3, &scoring), LeadTier::Low);
    }

    #[test]
    fn tier_filter_matching() {
        assert!(TierFilter::All.matches(None));
        assert!(TierFilter::All.matches(Some(LeadTier::Low)));
        let high = TierFilter::Only(LeadTier::High);
        assert!(high.matches(Some(LeadTier::High)));
        assert!(!high.matches(Some(LeadTier::Medium)));
        assert!(!high.matches(None));

        assert_eq!("all".parse::<TierFilter>().unwrap(), TierFilter::All);
        assert_eq!("haut de gamme".parse::<TierFilter>().unwrap(), high);
    }

    #[test]
    fn status_roundtrip() {
        for status in [
            LeadStatus::Pending,
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Qualified,
            LeadStatus::Converted,
            LeadStatus::Lost,
        ] {
            assert_eq!(status.as_str().parse::<LeadStatus>().unwrap(), status);
        }
    }

    #[test]
    fn lead_validation() {
        let mut lead = Lead::new("Acme", Some(LeadTier::High));
        assert!(lead.validate().is_ok());

        lead.email = Some("not-an-email".into());
        assert!(lead.validate().is_err());

        lead.email = Some("sales@acme.example".into());
        lead.score = Some(101);
        assert!(lead.validate().unwrap_err().to_string().contains("out of range"));

        let blank = Lead::new("   ", None);
        assert!(blank.validate().is_err());
    }

    #[test]
    fn group_unique_members_keeps_first_occurrence() {
        let a = CollaboratorId::new();
        let b = CollaboratorId::new();
        let group = Group {
            id: GroupId::new(),
            name: "inbound".into(),
            member_ids: vec![b.clone(), a.clone(), b.clone()],
            created_at: Utc::now(),
        };
        assert_eq!(group.unique_members(), vec![&b, &a]);
    }

    #[test]
    fn lead_serialization_skips_empty_fields() {
        let lead = Lead::new("Globex", None);
        let json = serde_json::to_string(&lead).expect("serialize");
        assert!(!json.contains("assigned_collaborator_id"));
        assert!(json.contains("\"status\":\"pending\""));
        let parsed: Lead = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.id, lead.id);
    }
}
