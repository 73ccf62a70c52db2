//! Visit model (user-owned, synced by push)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// Number of holes played in a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HolesPlayed {
    Nine,
    Eighteen,
}

impl HolesPlayed {
    pub const fn count(self) -> u8 {
        match self {
            Self::Nine => 9,
            Self::Eighteen => 18,
        }
    }
}

impl TryFrom<u8> for HolesPlayed {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            9 => Ok(Self::Nine),
            18 => Ok(Self::Eighteen),
            other => Err(format!("holes played must be 9 or 18, got {other}")),
        }
    }
}

impl TryFrom<i64> for HolesPlayed {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| format!("holes played must be 9 or 18, got {value}"))
            .and_then(Self::try_from)
    }
}

impl From<HolesPlayed> for u8 {
    fn from(value: HolesPlayed) -> Self {
        value.count()
    }
}

/// A round played at a course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: EntityId,
    pub user_id: EntityId,
    pub course_id: EntityId,
    pub visit_date: NaiveDate,
    pub holes_played: HolesPlayed,
    pub gross_score: Option<i32>,
    pub tee_box_id: Option<EntityId>,
    pub tee_name: Option<String>,
    pub to_par: Option<i32>,
    pub server_updated_at: Option<DateTime<Utc>>,
    /// Locally modified, not yet pushed
    #[serde(skip)]
    pub is_dirty: bool,
    /// Soft-deleted locally, pending push
    #[serde(skip)]
    pub is_deleted: bool,
    /// Local mutation counter
    #[serde(skip)]
    pub revision: i64,
}

impl Visit {
    /// Build a new local visit for `user_id` from a draft.
    #[must_use]
    pub fn from_draft(user_id: EntityId, draft: VisitDraft) -> Self {
        Self {
            id: draft.id,
            user_id,
            course_id: draft.course_id,
            visit_date: draft.visit_date,
            holes_played: draft.holes_played,
            gross_score: draft.gross_score,
            tee_box_id: draft.tee_box_id,
            tee_name: draft.tee_name,
            to_par: None,
            server_updated_at: None,
            is_dirty: true,
            is_deleted: false,
            revision: 0,
        }
    }

    /// Score relative to par, only defined for full rounds with a known par.
    pub fn compute_to_par(&self, par_total: Option<i32>) -> Option<i32> {
        match (self.holes_played, self.gross_score, par_total) {
            (HolesPlayed::Eighteen, Some(gross), Some(par)) => gross.checked_sub(par),
            _ => None,
        }
    }

    /// Whether the server has ever acknowledged this visit
    pub const fn is_known_remotely(&self) -> bool {
        self.server_updated_at.is_some()
    }
}

/// Visit fields sent to the server on create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDraft {
    #[serde(default)]
    pub id: EntityId,
    pub course_id: EntityId,
    pub visit_date: NaiveDate,
    pub holes_played: HolesPlayed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gross_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tee_box_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tee_name: Option<String>,
}

impl VisitDraft {
    /// Draft with a freshly generated id
    #[must_use]
    pub fn new(course_id: EntityId, visit_date: NaiveDate, holes_played: HolesPlayed) -> Self {
        Self {
            id: EntityId::new(),
            course_id,
            visit_date,
            holes_played,
            gross_score: None,
            tee_box_id: None,
            tee_name: None,
        }
    }
}

impl From<&Visit> for VisitDraft {
    fn from(visit: &Visit) -> Self {
        Self {
            id: visit.id.clone(),
            course_id: visit.course_id.clone(),
            visit_date: visit.visit_date,
            holes_played: visit.holes_played,
            gross_score: visit.gross_score,
            tee_box_id: visit.tee_box_id.clone(),
            tee_name: visit.tee_name.clone(),
        }
    }
}

/// Partial update of a local visit; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitPatch {
    pub visit_date: Option<NaiveDate>,
    pub holes_played: Option<HolesPlayed>,
    pub gross_score: Option<i32>,
    pub tee_box_id: Option<EntityId>,
    pub tee_name: Option<String>,
}

impl VisitPatch {
    pub const fn is_empty(&self) -> bool {
        self.visit_date.is_none()
            && self.holes_played.is_none()
            && self.gross_score.is_none()
            && self.tee_box_id.is_none()
            && self.tee_name.is_none()
    }

    /// Apply the patch on top of `visit`
    pub fn apply(self, visit: &mut Visit) {
        if let Some(visit_date) = self.visit_date {
            visit.visit_date = visit_date;
        }
        if let Some(holes_played) = self.holes_played {
            visit.holes_played = holes_played;
        }
        if let Some(gross_score) = self.gross_score {
            visit.gross_score = Some(gross_score);
        }
        if let Some(tee_box_id) = self.tee_box_id {
            visit.tee_box_id = Some(tee_box_id);
        }
        if let Some(tee_name) = self.tee_name {
            visit.tee_name = Some(tee_name);
        }
    }
}

/// Filters for visit listings (local and remote)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}
