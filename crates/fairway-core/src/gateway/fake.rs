//! In-process stand-in for the remote service, used by engine and façade tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use super::{AuthResponse, GatewayResult, RegisterRequest, RemoteGateway};
use crate::error::NetworkError;
use crate::models::{
    Course, CourseDetail, CourseSearchParams, CourseSuggestion, EntityId, StatsOverview,
    StatsTimelinePoint, SuggestionDraft, TimelineGrouping, UserProfile, Visit, VisitDraft,
    VisitFilter, VisitPatch, WishlistEntry,
};
use crate::services::DatabaseService;

pub struct FakeState {
    /// Every request, as `METHOD /path`
    pub calls: Vec<String>,
    pub user: Option<UserProfile>,
    pub courses: HashMap<EntityId, CourseDetail>,
    pub course_delta: Vec<CourseDetail>,
    pub suggestion_delta: Vec<CourseSuggestion>,
    pub visits: Vec<Visit>,
    pub wishlist: Vec<WishlistEntry>,
    pub stats: Option<StatsOverview>,
    pub failures: HashMap<&'static str, NetworkError>,
    /// Version handed out by the next write
    pub clock: DateTime<Utc>,
    /// Local edit applied while a visit create is in flight
    pub edit_during_create: Option<(DatabaseService, EntityId, VisitPatch)>,
    /// `(entered, release)` pair that holds the course delta request open
    pub hold_course_delta: Option<(Arc<Notify>, Arc<Notify>)>,
    /// Serve every visit page from the start, like a server without paging
    pub ignore_visit_offset: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            user: None,
            courses: HashMap::new(),
            course_delta: Vec::new(),
            suggestion_delta: Vec::new(),
            visits: Vec::new(),
            wishlist: Vec::new(),
            stats: None,
            failures: HashMap::new(),
            clock: DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
                .map(|value| value.with_timezone(&Utc))
                .unwrap_or_default(),
            edit_during_create: None,
            hold_course_delta: None,
            ignore_visit_offset: false,
        }
    }
}

impl FakeState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::minutes(1);
        self.clock
    }

    fn user_id(&self) -> EntityId {
        self.user
            .as_ref()
            .map_or_else(|| EntityId::from("u1"), |user| user.id.clone())
    }
}

#[derive(Clone, Default)]
pub struct FakeGateway {
    inner: Arc<Mutex<FakeState>>,
}

fn not_found(what: &str) -> NetworkError {
    NetworkError::Status {
        status: 404,
        body: format!("{what} not found (404)"),
    }
}

impl FakeGateway {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Requests other than `GET`
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("GET "))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Fail every later call of `operation` with `error`.
    pub fn fail(&self, operation: &'static str, error: NetworkError) {
        self.state().failures.insert(operation, error);
    }

    pub fn recover(&self, operation: &'static str) {
        self.state().failures.remove(operation);
    }

    /// Record the request and return the configured failure, if any.
    fn begin(&self, operation: &'static str, call: String) -> GatewayResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(call);
        match state.failures.get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn list_courses(&self, _params: &CourseSearchParams) -> GatewayResult<Vec<Course>> {
        let state = self.begin("list_courses", "GET /api/courses".to_string())?;
        let mut courses: Vec<Course> = state
            .courses
            .values()
            .map(|detail| detail.course.clone())
            .collect();
        courses.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(courses)
    }

    async fn get_course(&self, id: &EntityId) -> GatewayResult<CourseDetail> {
        let state = self.begin("get_course", format!("GET /api/courses/{id}"))?;
        state.courses.get(id).cloned().ok_or_else(|| not_found("Course"))
    }

    async fn course_delta(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> GatewayResult<Vec<CourseDetail>> {
        let (rows, hold) = {
            let state = self.begin("course_delta", "GET /api/courses/delta".to_string())?;
            let rows: Vec<CourseDetail> = state
                .course_delta
                .iter()
                .filter(|row| since.map_or(true, |since| row.course.version() > since))
                .cloned()
                .collect();
            (rows, state.hold_course_delta.clone())
        };
        if let Some((entered, release)) = hold {
            entered.notify_one();
            release.notified().await;
        }
        Ok(rows)
    }

    async fn list_visits(&self, filter: &VisitFilter) -> GatewayResult<Vec<Visit>> {
        let state = self.begin("list_visits", "GET /api/me/visits".to_string())?;
        let offset = if state.ignore_visit_offset {
            0
        } else {
            filter.offset.unwrap_or(0) as usize
        };
        let limit = filter.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(state
            .visits
            .iter()
            .filter(|visit| {
                filter
                    .course_id
                    .as_ref()
                    .map_or(true, |course_id| &visit.course_id == course_id)
            })
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_visit(&self, draft: &VisitDraft) -> GatewayResult<Visit> {
        let edit = {
            let mut state = self.begin("create_visit", "POST /api/visits".to_string())?;
            state.edit_during_create.take()
        };
        if let Some((db, id, patch)) = edit {
            db.update_visit(&id, patch)
                .await
                .map_err(|error| NetworkError::Connectivity(error.to_string()))?;
        }

        let mut state = self.state();
        let mut visit = Visit::from_draft(state.user_id(), draft.clone());
        visit.is_dirty = false;
        visit.server_updated_at = Some(state.tick());
        state.visits.retain(|existing| existing.id != visit.id);
        state.visits.push(visit.clone());
        Ok(visit)
    }

    async fn update_visit(&self, id: &EntityId, draft: &VisitDraft) -> GatewayResult<Visit> {
        let mut state = self.begin("update_visit", format!("PATCH /api/me/visits/{id}"))?;
        let version = state.tick();
        let user_id = state.user_id();
        let visit = state
            .visits
            .iter_mut()
            .find(|visit| &visit.id == id)
            .ok_or_else(|| not_found("Visit"))?;
        *visit = Visit::from_draft(user_id, draft.clone());
        visit.is_dirty = false;
        visit.server_updated_at = Some(version);
        Ok(visit.clone())
    }

    async fn delete_visit(&self, id: &EntityId) -> GatewayResult<()> {
        let mut state = self.begin("delete_visit", format!("DELETE /api/me/visits/{id}"))?;
        let before = state.visits.len();
        state.visits.retain(|visit| &visit.id != id);
        if state.visits.len() == before {
            return Err(not_found("Visit"));
        }
        Ok(())
    }

    async fn visited_courses(&self) -> GatewayResult<Vec<Visit>> {
        let state = self.begin("visited_courses", "GET /api/me/visited-courses".to_string())?;
        Ok(state.visits.clone())
    }

    async fn list_wishlist(&self) -> GatewayResult<Vec<WishlistEntry>> {
        let state = self.begin("list_wishlist", "GET /api/me/wishlist".to_string())?;
        Ok(state.wishlist.clone())
    }

    async fn add_to_wishlist(&self, course_id: &EntityId) -> GatewayResult<WishlistEntry> {
        let mut state = self.begin("add_to_wishlist", "POST /api/wishlist".to_string())?;
        if let Some(existing) = state
            .wishlist
            .iter()
            .find(|entry| &entry.course_id == course_id)
        {
            return Ok(existing.clone());
        }
        let mut entry = WishlistEntry::new(state.user_id(), course_id.clone());
        entry.is_dirty = false;
        entry.server_updated_at = Some(state.tick());
        state.wishlist.push(entry.clone());
        Ok(entry)
    }

    async fn remove_from_wishlist(&self, course_id: &EntityId) -> GatewayResult<()> {
        let mut state = self.begin(
            "remove_from_wishlist",
            format!("DELETE /api/wishlist/{course_id}"),
        )?;
        let before = state.wishlist.len();
        state.wishlist.retain(|entry| &entry.course_id != course_id);
        if state.wishlist.len() == before {
            return Err(not_found("Wishlist entry"));
        }
        Ok(())
    }

    async fn stats_overview(&self) -> GatewayResult<StatsOverview> {
        let state = self.begin("stats_overview", "GET /api/me/stats/overview".to_string())?;
        state.stats.clone().ok_or_else(|| not_found("Stats"))
    }

    async fn stats_timeline(
        &self,
        group_by: TimelineGrouping,
    ) -> GatewayResult<Vec<StatsTimelinePoint>> {
        let _state = self.begin(
            "stats_timeline",
            format!("GET /api/me/stats/timeline?groupBy={group_by}"),
        )?;
        Ok(Vec::new())
    }

    async fn public_stats(&self, slug: &str) -> GatewayResult<StatsOverview> {
        let state = self.begin(
            "public_stats",
            format!("GET /api/profile/{slug}/stats/overview"),
        )?;
        state.stats.clone().ok_or_else(|| not_found("Profile"))
    }

    async fn public_visited_courses(&self, slug: &str) -> GatewayResult<Vec<Visit>> {
        let state = self.begin(
            "public_visited_courses",
            format!("GET /api/profile/{slug}/visited-courses"),
        )?;
        Ok(state.visits.clone())
    }

    async fn submit_suggestion(&self, draft: &SuggestionDraft) -> GatewayResult<CourseSuggestion> {
        let mut state = self.begin(
            "submit_suggestion",
            "POST /api/course-suggestions".to_string(),
        )?;
        let mut suggestion = CourseSuggestion::from_draft(state.user_id(), draft.clone());
        suggestion.server_updated_at = Some(state.tick());
        Ok(suggestion)
    }

    async fn suggestion_delta(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> GatewayResult<Vec<CourseSuggestion>> {
        let state = self.begin(
            "suggestion_delta",
            "GET /api/course-suggestions/delta".to_string(),
        )?;
        Ok(state
            .suggestion_delta
            .iter()
            .filter(|row| since.map_or(true, |since| row.version() > since))
            .cloned()
            .collect())
    }

    async fn login(&self, email: &str, _password: &str) -> GatewayResult<AuthResponse> {
        let state = self.begin("login", "POST /api/auth/login".to_string())?;
        let user = state.user.clone().ok_or(NetworkError::Status {
            status: 401,
            body: "Invalid credentials (401)".to_string(),
        })?;
        Ok(AuthResponse {
            token: format!("token-{email}"),
            user,
        })
    }

    async fn register(&self, request: &RegisterRequest) -> GatewayResult<AuthResponse> {
        let mut state = self.begin("register", "POST /api/user".to_string())?;
        let user = UserProfile {
            id: EntityId::from("u1"),
            email: request.email.clone(),
            display_name: request.display_name.clone(),
            role: crate::models::Role::User,
            public_slug: request.display_name.to_lowercase(),
        };
        state.user = Some(user.clone());
        Ok(AuthResponse {
            token: format!("token-{}", request.email),
            user,
        })
    }

    async fn current_user(&self) -> GatewayResult<UserProfile> {
        let state = self.begin("current_user", "GET /api/auth/me".to_string())?;
        state.user.clone().ok_or(NetworkError::Status {
            status: 401,
            body: "Unauthorized (401)".to_string(),
        })
    }
}
