//! Wishlist entry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// A course the user wants to play
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistEntry {
    pub id: EntityId,
    pub user_id: EntityId,
    pub course_id: EntityId,
    pub created_at: DateTime<Utc>,
    pub server_updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub is_dirty: bool,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(skip)]
    pub revision: i64,
}

impl WishlistEntry {
    /// New local entry, pending push
    #[must_use]
    pub fn new(user_id: EntityId, course_id: EntityId) -> Self {
        Self {
            id: EntityId::new(),
            user_id,
            course_id,
            created_at: Utc::now(),
            server_updated_at: None,
            is_dirty: true,
            is_deleted: false,
            revision: 0,
        }
    }

    /// Version of a server copy, falling back to its creation time
    pub fn version(&self) -> DateTime<Utc> {
        self.server_updated_at.unwrap_or(self.created_at)
    }
}
