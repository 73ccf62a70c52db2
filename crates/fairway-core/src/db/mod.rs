//! Database layer for Fairway

mod connection;
mod course_repository;
mod migrations;
pub mod store;
mod suggestion_repository;
mod sync_repository;
mod visit_repository;
mod wishlist_repository;

#[cfg(test)]
pub(crate) mod fixtures;

use std::fmt;

pub use connection::Database;
pub use course_repository::{CourseRepository, LibSqlCourseRepository};
pub use migrations::CURRENT_VERSION as SCHEMA_VERSION;
pub use store::ExecuteResult;
pub use suggestion_repository::{LibSqlSuggestionRepository, SuggestionRepository};
pub use sync_repository::{LibSqlSyncRepository, SyncRepository};
pub use visit_repository::{LibSqlVisitRepository, VisitRepository};
pub use wishlist_repository::{LibSqlWishlistRepository, WishlistRepository};

/// Tables mirrored from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTable {
    Courses,
    Visits,
    WishlistEntries,
    CourseSuggestions,
}

impl SyncTable {
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Courses => "courses",
            Self::Visits => "visits",
            Self::WishlistEntries => "wishlist_entries",
            Self::CourseSuggestions => "course_suggestions",
        }
    }

    /// Whether rows carry dirty/deleted/revision tracking
    pub const fn tracks_local_changes(self) -> bool {
        matches!(self, Self::Visits | Self::WishlistEntries)
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Result of applying pulled rows to the local store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Rows inserted or overwritten
    pub applied: usize,
    /// Rows skipped by last-write-wins and logged to `sync_conflicts`
    pub conflicts: usize,
    /// Rows referencing a course missing from the local catalog
    pub skipped: usize,
}

impl MergeOutcome {
    pub fn absorb(&mut self, other: Self) {
        self.applied += other.applied;
        self.conflicts += other.conflicts;
        self.skipped += other.skipped;
    }
}
