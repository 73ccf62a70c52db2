//! Remote service access.
//!
//! [`RemoteGateway`] has one method per endpoint. Each call performs exactly
//! one HTTP request and keeps no state of its own; the bearer token comes from
//! the shared [`crate::auth::Session`].

mod http;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::models::{
    Course, CourseDetail, CourseSearchParams, CourseSuggestion, EntityId, StatsOverview,
    StatsTimelinePoint, SuggestionDraft, TimelineGrouping, UserProfile, Visit, VisitDraft,
    VisitFilter, WishlistEntry,
};

pub use http::{parse_api_error, HttpGateway};

/// Result type for gateway calls
pub type GatewayResult<T> = std::result::Result<T, NetworkError>;

/// Payload returned by login and registration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AuthResponse")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

/// Registration form
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Endpoints of the remote course-tracking service
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// `GET /api/courses`
    async fn list_courses(&self, params: &CourseSearchParams) -> GatewayResult<Vec<Course>>;

    /// `GET /api/courses/{id}`
    async fn get_course(&self, id: &EntityId) -> GatewayResult<CourseDetail>;

    /// `GET /api/courses/delta?since=`
    async fn course_delta(&self, since: Option<DateTime<Utc>>)
        -> GatewayResult<Vec<CourseDetail>>;

    /// `GET /api/me/visits`
    async fn list_visits(&self, filter: &VisitFilter) -> GatewayResult<Vec<Visit>>;

    /// `POST /api/visits`; the response must carry `serverUpdatedAt`
    async fn create_visit(&self, draft: &VisitDraft) -> GatewayResult<Visit>;

    /// `PATCH /api/me/visits/{id}`; the response must carry `serverUpdatedAt`
    async fn update_visit(&self, id: &EntityId, draft: &VisitDraft) -> GatewayResult<Visit>;

    /// `DELETE /api/me/visits/{id}`
    async fn delete_visit(&self, id: &EntityId) -> GatewayResult<()>;

    /// `GET /api/me/visited-courses`
    async fn visited_courses(&self) -> GatewayResult<Vec<Visit>>;

    /// `GET /api/me/wishlist`
    async fn list_wishlist(&self) -> GatewayResult<Vec<WishlistEntry>>;

    /// `POST /api/wishlist`
    async fn add_to_wishlist(&self, course_id: &EntityId) -> GatewayResult<WishlistEntry>;

    /// `DELETE /api/wishlist/{courseId}`
    async fn remove_from_wishlist(&self, course_id: &EntityId) -> GatewayResult<()>;

    /// `GET /api/me/stats/overview`
    async fn stats_overview(&self) -> GatewayResult<StatsOverview>;

    /// `GET /api/me/stats/timeline?groupBy=`
    async fn stats_timeline(
        &self,
        group_by: TimelineGrouping,
    ) -> GatewayResult<Vec<StatsTimelinePoint>>;

    /// `GET /api/profile/{slug}/stats/overview`
    async fn public_stats(&self, slug: &str) -> GatewayResult<StatsOverview>;

    /// `GET /api/profile/{slug}/visited-courses`
    async fn public_visited_courses(&self, slug: &str) -> GatewayResult<Vec<Visit>>;

    /// `POST /api/course-suggestions`
    async fn submit_suggestion(&self, draft: &SuggestionDraft) -> GatewayResult<CourseSuggestion>;

    /// `GET /api/course-suggestions/delta?since=`
    async fn suggestion_delta(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> GatewayResult<Vec<CourseSuggestion>>;

    /// `POST /api/auth/login`
    async fn login(&self, email: &str, password: &str) -> GatewayResult<AuthResponse>;

    /// `POST /api/user`
    async fn register(&self, request: &RegisterRequest) -> GatewayResult<AuthResponse>;

    /// `GET /api/auth/me`
    async fn current_user(&self) -> GatewayResult<UserProfile>;
}
