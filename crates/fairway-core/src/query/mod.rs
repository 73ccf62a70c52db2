//! Query façade consumed by front ends.
//!
//! Remote reads go through the session's [`QueryCache`]; user-owned data is
//! read from the local store. Every mutation writes locally, reports the
//! cache scopes it invalidated and nudges the sync runner.

mod cache;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::auth::{AuthService, Session, SessionPersistence};
use crate::error::{Error, Result};
use crate::gateway::RemoteGateway;
use crate::models::{
    Course, CourseDetail, CourseSearchParams, CourseSuggestion, EntityId, StatsOverview,
    StatsTimelinePoint, SuggestionDraft, SyncConflict, TimelineGrouping, Visit, VisitDraft,
    VisitFilter, VisitPatch, VisitedCourse, WishlistEntry,
};
use crate::services::DatabaseService;
use crate::sync::{SyncStatus, SyncTrigger};

pub use cache::{CacheScope, QueryCache, QueryKey, DEFAULT_STALE_AFTER};

const VISIT_SCOPES: [CacheScope; 3] = [
    CacheScope::Visits,
    CacheScope::VisitedCourses,
    CacheScope::Stats,
];

/// Result of a local mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    pub value: T,
    /// Scopes whose cached reads are now out of date
    pub invalidated: Vec<CacheScope>,
}

#[derive(Clone)]
struct SyncHandle {
    triggers: mpsc::Sender<SyncTrigger>,
    status: watch::Receiver<SyncStatus>,
}

/// Typed entry point over the local store, the remote gateway and sync.
#[derive(Clone)]
pub struct FairwayClient {
    session: Session,
    db: DatabaseService,
    gateway: Arc<dyn RemoteGateway>,
    sync: Option<SyncHandle>,
}

impl FairwayClient {
    pub fn new(session: Session, db: DatabaseService, gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            session,
            db,
            gateway,
            sync: None,
        }
    }

    /// Attach a running sync engine's trigger sender and status channel.
    #[must_use]
    pub fn with_sync(
        mut self,
        triggers: mpsc::Sender<SyncTrigger>,
        status: watch::Receiver<SyncStatus>,
    ) -> Self {
        self.sync = Some(SyncHandle { triggers, status });
        self
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub const fn database(&self) -> &DatabaseService {
        &self.db
    }

    /// Auth flows sharing this client's gateway and session.
    pub fn auth<S: SessionPersistence>(&self, store: S) -> AuthService<S> {
        AuthService::new(Arc::clone(&self.gateway), self.session.clone(), store)
    }

    fn cache(&self) -> &QueryCache {
        self.session.cache()
    }

    fn user_id(&self) -> Result<EntityId> {
        self.session.user_id().ok_or(Error::NotAuthenticated)
    }

    fn mutation<T>(&self, value: T, invalidated: &[CacheScope]) -> Mutation<T> {
        self.cache().invalidate_scopes(invalidated);
        self.trigger_sync();
        Mutation {
            value,
            invalidated: invalidated.to_vec(),
        }
    }

    // -- courses ------------------------------------------------------------

    /// Catalog search. Results are stored locally; when the service is
    /// unreachable the local catalog answers instead.
    pub async fn courses(&self, params: &CourseSearchParams) -> Result<Vec<Course>> {
        let key = QueryKey::with_params(CacheScope::Courses, params)?;
        let fetched = self
            .cache()
            .get_or_fetch(key, || async {
                let courses = self.gateway.list_courses(params).await?;
                self.db.upsert_course_summaries(&courses).await?;
                Ok(courses)
            })
            .await;

        match fetched {
            Err(Error::Network(error)) if error.is_retryable() => {
                tracing::warn!("Course search offline, using local catalog: {}", error);
                self.db.search_courses(params).await
            }
            other => other,
        }
    }

    pub async fn course_detail(&self, id: &EntityId) -> Result<CourseDetail> {
        let key = QueryKey::new(CacheScope::CourseDetail, id.as_str());
        let fetched = self
            .cache()
            .get_or_fetch(key, || async {
                let detail = self.gateway.get_course(id).await?;
                self.db.upsert_courses(std::slice::from_ref(&detail)).await?;
                Ok(detail)
            })
            .await;

        match fetched {
            Err(Error::Network(error)) if error.is_retryable() => {
                match self.db.get_course_detail(id).await? {
                    Some(detail) => {
                        tracing::warn!("Course {id} offline, using local copy: {}", error);
                        Ok(detail)
                    }
                    None => Err(Error::Network(error)),
                }
            }
            other => other,
        }
    }

    // -- user data (local) ----------------------------------------------------

    pub async fn visits(&self, filter: &VisitFilter) -> Result<Vec<Visit>> {
        let user_id = self.user_id()?;
        self.db.list_visits(&user_id, filter).await
    }

    pub async fn visited_courses(&self) -> Result<Vec<VisitedCourse>> {
        let user_id = self.user_id()?;
        self.db.list_visited_courses(&user_id).await
    }

    pub async fn wishlist(&self) -> Result<Vec<WishlistEntry>> {
        let user_id = self.user_id()?;
        self.db.list_wishlist(&user_id).await
    }

    pub async fn suggestions(&self) -> Result<Vec<CourseSuggestion>> {
        let user_id = self.user_id()?;
        self.db.list_suggestions(Some(&user_id), None).await
    }

    // -- stats and profiles (remote) -----------------------------------------

    pub async fn stats_overview(&self) -> Result<StatsOverview> {
        self.user_id()?;
        self.cache()
            .get_or_fetch(QueryKey::new(CacheScope::Stats, "overview"), || async {
                Ok(self.gateway.stats_overview().await?)
            })
            .await
    }

    pub async fn stats_timeline(
        &self,
        group_by: TimelineGrouping,
    ) -> Result<Vec<StatsTimelinePoint>> {
        self.user_id()?;
        let key = QueryKey::new(CacheScope::Stats, format!("timeline:{group_by}"));
        self.cache()
            .get_or_fetch(key, || async {
                Ok(self.gateway.stats_timeline(group_by).await?)
            })
            .await
    }

    pub async fn public_stats(&self, slug: &str) -> Result<StatsOverview> {
        let slug = required_slug(slug)?;
        let key = QueryKey::new(CacheScope::PublicProfile, format!("stats:{slug}"));
        self.cache()
            .get_or_fetch(key, || async { Ok(self.gateway.public_stats(slug).await?) })
            .await
    }

    pub async fn public_visited_courses(&self, slug: &str) -> Result<Vec<Visit>> {
        let slug = required_slug(slug)?;
        let key = QueryKey::new(CacheScope::PublicProfile, format!("visited:{slug}"));
        self.cache()
            .get_or_fetch(key, || async {
                Ok(self.gateway.public_visited_courses(slug).await?)
            })
            .await
    }

    // -- sync -------------------------------------------------------------------

    /// Last published sync status with a fresh pending-change count.
    pub async fn sync_status(&self) -> Result<SyncStatus> {
        let mut status = self
            .sync
            .as_ref()
            .map(|sync| sync.status.borrow().clone())
            .unwrap_or_default();
        status.pending_changes = self.db.pending_changes().await?;
        Ok(status)
    }

    pub async fn sync_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        self.db.list_conflicts(limit).await
    }

    /// Ask the sync runner for a cycle. Returns whether a runner is attached
    /// and accepted the request.
    pub fn trigger_sync(&self) -> bool {
        let Some(sync) = &self.sync else {
            return false;
        };
        match sync.triggers.try_send(SyncTrigger::Manual) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Sync trigger queue full; request coalesced");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Sync runner is not running");
                false
            }
        }
    }

    /// Drop every cached query, typically after a successful sync.
    pub fn invalidate_all(&self) {
        self.cache().invalidate_all();
    }

    // -- mutations ----------------------------------------------------------------

    pub async fn record_visit(&self, draft: VisitDraft) -> Result<Mutation<Visit>> {
        let user_id = self.user_id()?;
        let visit = self.db.create_visit(&user_id, draft).await?;
        tracing::debug!(visit_id = %visit.id, "Recorded visit");
        Ok(self.mutation(visit, &VISIT_SCOPES))
    }

    pub async fn update_visit(&self, id: &EntityId, patch: VisitPatch) -> Result<Mutation<Visit>> {
        self.owned_visit(id).await?;
        let visit = self.db.update_visit(id, patch).await?;
        Ok(self.mutation(visit, &VISIT_SCOPES))
    }

    pub async fn delete_visit(&self, id: &EntityId) -> Result<Mutation<Visit>> {
        self.owned_visit(id).await?;
        let visit = self.db.soft_delete_visit(id).await?;
        Ok(self.mutation(visit, &VISIT_SCOPES))
    }

    async fn owned_visit(&self, id: &EntityId) -> Result<Visit> {
        let user_id = self.user_id()?;
        match self.db.get_visit(id).await? {
            Some(visit) if visit.user_id == user_id => Ok(visit),
            _ => Err(Error::NotFound(format!("visit {id}"))),
        }
    }

    pub async fn add_to_wishlist(&self, course_id: &EntityId) -> Result<Mutation<WishlistEntry>> {
        let user_id = self.user_id()?;
        let entry = self.db.add_wishlist_entry(&user_id, course_id).await?;
        Ok(self.mutation(entry, &[CacheScope::Wishlist]))
    }

    /// Remove a course from the wishlist. Removing a course that is not
    /// listed changes nothing and returns `None`.
    pub async fn remove_from_wishlist(
        &self,
        course_id: &EntityId,
    ) -> Result<Mutation<Option<WishlistEntry>>> {
        let user_id = self.user_id()?;
        match self.db.remove_wishlist_entry(&user_id, course_id).await? {
            Some(entry) => Ok(self.mutation(Some(entry), &[CacheScope::Wishlist])),
            None => Ok(Mutation {
                value: None,
                invalidated: Vec::new(),
            }),
        }
    }

    pub async fn suggest_course(
        &self,
        draft: SuggestionDraft,
    ) -> Result<Mutation<CourseSuggestion>> {
        let user_id = self.user_id()?;
        let suggestion = self.db.create_suggestion(&user_id, draft).await?;
        Ok(self.mutation(suggestion, &[CacheScope::Suggestions]))
    }
}

fn required_slug(slug: &str) -> Result<&str> {
    let slug = slug.trim();
    if slug.is_empty() {
        return Err(Error::Validation("Profile slug is required".to_string()));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSession;
    use crate::db::fixtures::{date, detail};
    use crate::error::NetworkError;
    use crate::gateway::fake::FakeGateway;
    use crate::models::{HolesPlayed, Role, UserProfile};
    use pretty_assertions::assert_eq;

    fn profile() -> UserProfile {
        UserProfile {
            id: EntityId::from("u1"),
            email: "golfer@example.com".to_string(),
            display_name: "Golfer".to_string(),
            role: Role::User,
            public_slug: "golfer".to_string(),
        }
    }

    async fn setup() -> (FairwayClient, FakeGateway, mpsc::Receiver<SyncTrigger>) {
        let db = DatabaseService::open_in_memory().await.unwrap();
        db.upsert_courses(&[detail("c1", "2024-01-01", &[("t1", Some(72))])])
            .await
            .unwrap();
        let gateway = FakeGateway::default();
        let session = Session::with_auth(AuthSession {
            token: "token".to_string(),
            user: profile(),
        });
        let (triggers, receiver) = crate::sync::trigger_channel();
        let (_, status) = watch::channel(SyncStatus::default());
        let client =
            FairwayClient::new(session, db, Arc::new(gateway.clone())).with_sync(triggers, status);
        (client, gateway, receiver)
    }

    fn visit_draft() -> VisitDraft {
        VisitDraft {
            id: EntityId::from("v1"),
            gross_score: Some(80),
            tee_box_id: Some(EntityId::from("t1")),
            ..VisitDraft::new(EntityId::from("c1"), date("2024-05-01"), HolesPlayed::Eighteen)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn course_search_is_cached_and_stored() {
        let (client, gateway, _receiver) = setup().await;
        gateway.state().courses.insert(
            EntityId::from("c2"),
            detail("c2", "2024-02-01", &[]),
        );
        let params = CourseSearchParams::default();

        let first = client.courses(&params).await.unwrap();
        let second = client.courses(&params).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(gateway.calls(), vec!["GET /api/courses".to_string()]);
        assert!(client
            .database()
            .course_exists(&EntityId::from("c2"))
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn course_search_falls_back_to_local_catalog() {
        let (client, gateway, _receiver) = setup().await;
        gateway.fail("list_courses", NetworkError::Connectivity("offline".to_string()));

        let courses = client
            .courses(&CourseSearchParams {
                search: Some("c1".to_string()),
                ..CourseSearchParams::default()
            })
            .await
            .unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].id, EntityId::from("c1"));
        assert!(client.session().cache().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_errors_are_not_masked_by_fallback() {
        let (client, gateway, _receiver) = setup().await;
        gateway.fail(
            "get_course",
            NetworkError::Status {
                status: 400,
                body: "bad id (400)".to_string(),
            },
        );
        let error = client
            .course_detail(&EntityId::from("c1"))
            .await
            .unwrap_err();
        assert_eq!(error.as_network().and_then(NetworkError::status), Some(400));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_visit_invalidates_and_nudges_sync() {
        let (client, gateway, mut receiver) = setup().await;
        client
            .session()
            .cache()
            .insert(QueryKey::new(CacheScope::Stats, "overview"), 1_i64);

        let mutation = client.record_visit(visit_draft()).await.unwrap();
        assert_eq!(mutation.value.to_par, Some(8));
        assert_eq!(mutation.invalidated, VISIT_SCOPES.to_vec());
        assert!(client.session().cache().is_empty());
        assert_eq!(receiver.try_recv().unwrap(), SyncTrigger::Manual);
        assert!(gateway.calls().is_empty());

        let visits = client.visits(&VisitFilter::default()).await.unwrap();
        assert_eq!(visits.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn removing_unlisted_course_is_a_silent_no_op() {
        let (client, gateway, mut receiver) = setup().await;

        let mutation = client
            .remove_from_wishlist(&EntityId::from("c1"))
            .await
            .unwrap();
        assert_eq!(mutation.value, None);
        assert!(mutation.invalidated.is_empty());
        assert!(receiver.try_recv().is_err());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wishlist_add_is_idempotent() {
        let (client, _gateway, _receiver) = setup().await;
        let first = client.add_to_wishlist(&EntityId::from("c1")).await.unwrap();
        let second = client.add_to_wishlist(&EntityId::from("c1")).await.unwrap();
        assert_eq!(first.value.id, second.value.id);
        assert_eq!(client.wishlist().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn user_queries_require_sign_in() {
        let (client, _gateway, _receiver) = setup().await;
        client.session().clear();
        assert!(matches!(
            client.visits(&VisitFilter::default()).await,
            Err(Error::NotAuthenticated)
        ));
        assert!(matches!(
            client.stats_overview().await,
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stats_are_refetched_after_invalidate_all() {
        let (client, gateway, _receiver) = setup().await;
        gateway.state().stats = Some(StatsOverview {
            total_courses: 1,
            total_visits: 2,
            most_recent_visit_date: Some("2024-05-01".to_string()),
            visits_by_year: Vec::new(),
            visits_by_region: Vec::new(),
            longest_month_streak: 1,
        });

        client.stats_overview().await.unwrap();
        client.stats_overview().await.unwrap();
        assert_eq!(gateway.calls().len(), 1);

        client.invalidate_all();
        let stats = client.stats_overview().await.unwrap();
        assert_eq!(stats.total_visits, 2);
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn other_users_visits_are_not_found() {
        let (client, _gateway, _receiver) = setup().await;
        client
            .database()
            .create_visit(&EntityId::from("u2"), visit_draft())
            .await
            .unwrap();

        let error = client
            .delete_visit(&EntityId::from("v1"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_status_counts_pending_changes() {
        let (client, _gateway, _receiver) = setup().await;
        client.record_visit(visit_draft()).await.unwrap();
        let status = client.sync_status().await.unwrap();
        assert_eq!(status.pending_changes, 1);
        assert!(client.trigger_sync());
    }
}
