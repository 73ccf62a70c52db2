//! User-submitted course suggestions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::EntityId;

/// Moderation state of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SuggestionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl SuggestionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown suggestion status '{other}'")),
        }
    }
}

/// A candidate course awaiting moderation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSuggestion {
    pub id: EntityId,
    pub submitted_by_user_id: EntityId,
    pub name: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state_region: Option<String>,
    pub country: String,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub status: SuggestionStatus,
    /// Moderator, set only after a decision
    pub decision_by: Option<String>,
    pub decision_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub server_updated_at: Option<DateTime<Utc>>,
}

impl CourseSuggestion {
    /// New local suggestion, awaiting submission
    #[must_use]
    pub fn from_draft(user_id: EntityId, draft: SuggestionDraft) -> Self {
        Self {
            id: draft.id,
            submitted_by_user_id: user_id,
            name: draft.name,
            address1: draft.address1,
            address2: draft.address2,
            city: draft.city,
            state_region: draft.state_region,
            country: draft.country,
            postal_code: draft.postal_code,
            phone: draft.phone,
            website: draft.website,
            status: SuggestionStatus::Pending,
            decision_by: None,
            decision_at: None,
            created_at: Utc::now(),
            server_updated_at: None,
        }
    }

    pub fn version(&self) -> DateTime<Utc> {
        self.server_updated_at
            .or(self.decision_at)
            .unwrap_or(self.created_at)
    }

    /// Decision fields are only meaningful once moderated
    pub fn is_decided(&self) -> bool {
        self.status != SuggestionStatus::Pending && self.decision_at.is_some()
    }
}

/// Suggestion fields sent on submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionDraft {
    #[serde(default)]
    pub id: EntityId,
    pub name: String,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_region: Option<String>,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl From<&CourseSuggestion> for SuggestionDraft {
    fn from(value: &CourseSuggestion) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
            address1: value.address1.clone(),
            address2: value.address2.clone(),
            city: value.city.clone(),
            state_region: value.state_region.clone(),
            country: value.country.clone(),
            postal_code: value.postal_code.clone(),
            phone: value.phone.clone(),
            website: value.website.clone(),
        }
    }
}
