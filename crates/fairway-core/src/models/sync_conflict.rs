//! Sync conflict model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pulled row that was skipped by the last-write-wins rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Table the pulled row belongs to
    pub table_name: String,
    /// Entity involved in the conflict
    pub row_id: String,
    /// Local version when the conflict occurred (`None` for never-pushed rows)
    pub local_version: Option<DateTime<Utc>>,
    /// Incoming version that was rejected
    pub incoming_version: DateTime<Utc>,
    /// Resolution timestamp
    pub resolved_at: DateTime<Utc>,
    /// Resolution strategy name
    pub strategy: String,
}
