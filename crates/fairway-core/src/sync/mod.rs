//! Push/pull reconciliation between the local store and the remote service.

mod backoff;
mod engine;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::db::{MergeOutcome, SyncTable};
use crate::models::EntityId;

pub use backoff::{backoff_delay, BASE_BACKOFF, MAX_BACKOFF};
pub use engine::SyncEngine;

/// Checkpoint key for the course catalog
pub const COURSES_COLLECTION: &str = "courses";
/// Checkpoint key for course suggestions
pub const SUGGESTIONS_COLLECTION: &str = "course_suggestions";

const TRIGGER_CHANNEL_CAPACITY: usize = 16;

/// Trigger channel consumed by [`SyncEngine::run`].
pub fn trigger_channel() -> (mpsc::Sender<SyncTrigger>, mpsc::Receiver<SyncTrigger>) {
    mpsc::channel(TRIGGER_CHANNEL_CAPACITY)
}

/// Why a cycle was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncTrigger {
    /// App returned to the foreground
    Foreground,
    /// Connectivity came back
    Reconnect,
    /// Explicit user request or a local mutation
    Manual,
    /// Scheduled after a failed cycle
    Retry,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Foreground => "foreground",
            Self::Reconnect => "reconnect",
            Self::Manual => "manual",
            Self::Retry => "retry",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncPhase {
    #[default]
    Idle,
    Pushing,
    Pulling,
    /// Last cycle did not complete cleanly; the next trigger starts over
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Pushing => "pushing",
            Self::Pulling => "pulling",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot published on the status channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub pending_changes: u64,
}

impl SyncStatus {
    pub const fn is_syncing(&self) -> bool {
        matches!(self.phase, SyncPhase::Pushing | SyncPhase::Pulling)
    }
}

/// A row the push phase could not deliver; it stays dirty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    pub table: SyncTable,
    pub id: EntityId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Network writes that succeeded
    pub pushed: usize,
    /// Rows acknowledged but edited again while in flight
    pub still_dirty: usize,
    pub failures: Vec<PushFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub courses: MergeOutcome,
    pub suggestions: MergeOutcome,
    pub visits: MergeOutcome,
    pub wishlist: MergeOutcome,
    /// First failure; later collections were not pulled
    pub error: Option<String>,
}

impl PullReport {
    pub fn applied(&self) -> usize {
        self.courses.applied + self.suggestions.applied + self.visits.applied + self.wishlist.applied
    }

    pub fn conflicts(&self) -> usize {
        self.courses.conflicts
            + self.suggestions.conflicts
            + self.visits.conflicts
            + self.wishlist.conflicts
    }
}

/// Outcome of one push + pull cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    pub push: PushReport,
    pub pull: PullReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.push.failures.is_empty() && self.pull.error.is_none()
    }

    /// Human-readable reason the cycle failed, if it did.
    pub fn error_summary(&self) -> Option<String> {
        if let Some(error) = &self.pull.error {
            return Some(format!("pull failed: {error}"));
        }
        let first = self.push.failures.first()?;
        Some(format!(
            "{} row(s) failed to push; first {}/{}: {}",
            self.push.failures.len(),
            first.table,
            first.id,
            first.error
        ))
    }
}
