//! Data models for Fairway

mod course;
mod id;
mod stats;
mod suggestion;
mod sync_conflict;
mod user;
mod visit;
mod wishlist;

pub use course::{Course, CourseDetail, CourseSearchParams, TeeBox, VisitedCourse};
pub use id::EntityId;
pub use stats::{RegionCount, StatsOverview, StatsTimelinePoint, TimelineGrouping, YearCount};
pub use suggestion::{CourseSuggestion, SuggestionDraft, SuggestionStatus};
pub use sync_conflict::SyncConflict;
pub use user::{Role, UserProfile};
pub use visit::{HolesPlayed, Visit, VisitDraft, VisitFilter, VisitPatch};
pub use wishlist::WishlistEntry;
