//! Sync cycle engine: push, pull, status and the background runner.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::{
    backoff_delay, PullReport, PushFailure, PushReport, SyncPhase, SyncReport, SyncStatus,
    SyncTrigger, COURSES_COLLECTION, SUGGESTIONS_COLLECTION,
};
use crate::auth::Session;
use crate::db::{MergeOutcome, SyncTable};
use crate::error::{Error, NetworkError, Result};
use crate::gateway::{GatewayResult, RemoteGateway};
use crate::models::{
    CourseSuggestion, EntityId, SuggestionDraft, Visit, VisitDraft, VisitFilter, WishlistEntry,
};
use crate::services::DatabaseService;

const VISIT_PAGE_SIZE: u32 = 100;

/// Server acknowledgement of one pushed row
enum Ack {
    Deleted,
    Version(DateTime<Utc>),
}

/// Clears the in-flight flag when a cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reconciles the local store with the remote service.
///
/// At most one cycle runs at a time; triggers that arrive meanwhile are
/// coalesced into the running cycle.
pub struct SyncEngine {
    db: DatabaseService,
    gateway: Arc<dyn RemoteGateway>,
    session: Session,
    running: AtomicBool,
    status: watch::Sender<SyncStatus>,
}

impl SyncEngine {
    pub fn new(db: DatabaseService, gateway: Arc<dyn RemoteGateway>, session: Session) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            db,
            gateway,
            session,
            running: AtomicBool::new(false),
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Recount pending local changes and publish them.
    pub async fn refresh_status(&self) -> Result<SyncStatus> {
        let pending = self.db.pending_changes().await?;
        self.status
            .send_modify(|status| status.pending_changes = pending);
        Ok(self.status())
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.status.send_modify(|status| status.phase = phase);
    }

    /// Run one push + pull cycle.
    ///
    /// Returns `Ok(None)` when another cycle is already running. Network
    /// failures are reported in the [`SyncReport`]; storage failures abort
    /// the cycle with an error. Either way the phase ends as
    /// [`SyncPhase::Failed`] unless everything succeeded.
    pub async fn sync_now(&self, trigger: SyncTrigger) -> Result<Option<SyncReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync already running; coalescing {trigger} trigger");
            return Ok(None);
        }
        let _guard = CycleGuard(&self.running);

        let started_at = Utc::now();
        tracing::info!("Sync cycle started ({trigger})");

        match self.cycle(trigger, started_at).await {
            Ok(report) => {
                self.finish(&report).await;
                Ok(Some(report))
            }
            Err(error) => {
                tracing::warn!("Sync cycle aborted: {}", error);
                let message = error.to_string();
                self.status.send_modify(|status| {
                    status.phase = SyncPhase::Failed;
                    status.last_error = Some(message);
                });
                Err(error)
            }
        }
    }

    async fn cycle(&self, trigger: SyncTrigger, started_at: DateTime<Utc>) -> Result<SyncReport> {
        self.set_phase(SyncPhase::Pushing);
        let push = self.push().await?;
        self.set_phase(SyncPhase::Pulling);
        let pull = self.pull().await?;

        Ok(SyncReport {
            trigger,
            push,
            pull,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn finish(&self, report: &SyncReport) {
        let pending = match self.db.pending_changes().await {
            Ok(pending) => Some(pending),
            Err(error) => {
                tracing::warn!("Failed to count pending changes: {}", error);
                None
            }
        };
        let error = report.error_summary();
        if error.is_none() {
            self.session.cache().invalidate_all();
        }

        tracing::info!(
            "Sync cycle finished: pushed={} pulled={} conflicts={} failed={}",
            report.push.pushed,
            report.pull.applied(),
            report.pull.conflicts(),
            error.is_some()
        );

        self.status.send_modify(|status| {
            if let Some(pending) = pending {
                status.pending_changes = pending;
            }
            if error.is_none() {
                status.phase = SyncPhase::Idle;
                status.last_success_at = Some(report.finished_at);
            } else {
                status.phase = SyncPhase::Failed;
            }
            status.last_error = error;
        });
    }

    // -- push ---------------------------------------------------------------

    /// Send every dirty row of the signed-in user, in insertion order.
    pub async fn push(&self) -> Result<PushReport> {
        let mut report = PushReport::default();
        let Some(user_id) = self.session.user_id() else {
            tracing::debug!("Skipping push: not signed in");
            return Ok(report);
        };

        for visit in self.db.list_dirty_visits().await? {
            if visit.user_id != user_id {
                continue;
            }
            let result = self.push_visit(&visit).await;
            self.acknowledge(SyncTable::Visits, &visit.id, visit.revision, result, &mut report)
                .await?;
        }

        for entry in self.db.list_dirty_wishlist_entries().await? {
            if entry.user_id != user_id {
                continue;
            }
            let result = self.push_wishlist_entry(&entry).await;
            self.acknowledge(
                SyncTable::WishlistEntries,
                &entry.id,
                entry.revision,
                result,
                &mut report,
            )
            .await?;
        }

        for suggestion in self.db.list_pending_submissions().await? {
            if suggestion.submitted_by_user_id != user_id {
                continue;
            }
            self.push_suggestion(&suggestion, &mut report).await?;
        }

        Ok(report)
    }

    async fn push_visit(&self, visit: &Visit) -> GatewayResult<Ack> {
        if visit.is_deleted {
            tracing::debug!(visit_id = %visit.id, "Pushing visit delete");
            return match self.gateway.delete_visit(&visit.id).await {
                Ok(()) => Ok(Ack::Deleted),
                Err(error) if error.is_not_found() => Ok(Ack::Deleted),
                Err(error) => Err(error),
            };
        }

        let draft = VisitDraft::from(visit);
        let pushed = if visit.is_known_remotely() {
            tracing::debug!(visit_id = %visit.id, "Pushing visit update");
            self.gateway.update_visit(&visit.id, &draft).await?
        } else {
            tracing::debug!(visit_id = %visit.id, "Pushing visit create");
            self.gateway.create_visit(&draft).await?
        };
        pushed
            .server_updated_at
            .map(Ack::Version)
            .ok_or_else(|| NetworkError::Decode(format!("visit {} has no version", visit.id)))
    }

    async fn push_wishlist_entry(&self, entry: &WishlistEntry) -> GatewayResult<Ack> {
        if entry.is_deleted {
            tracing::debug!(course_id = %entry.course_id, "Pushing wishlist removal");
            return match self.gateway.remove_from_wishlist(&entry.course_id).await {
                Ok(()) => Ok(Ack::Deleted),
                Err(error) if error.is_not_found() => Ok(Ack::Deleted),
                Err(error) => Err(error),
            };
        }

        // Entries have no update endpoint
        if let Some(version) = entry.server_updated_at {
            return Ok(Ack::Version(version));
        }

        tracing::debug!(course_id = %entry.course_id, "Pushing wishlist add");
        let created = self.gateway.add_to_wishlist(&entry.course_id).await?;
        Ok(Ack::Version(created.version()))
    }

    async fn acknowledge(
        &self,
        table: SyncTable,
        id: &EntityId,
        revision: i64,
        result: GatewayResult<Ack>,
        report: &mut PushReport,
    ) -> Result<()> {
        match result {
            Ok(Ack::Deleted) => {
                // The row is removed, the timestamp is never stored
                self.db.mark_synced(table, id, Utc::now()).await?;
                report.pushed += 1;
            }
            Ok(Ack::Version(version)) => {
                let clean = self
                    .db
                    .mark_synced_at_revision(table, id, version, revision)
                    .await?;
                report.pushed += 1;
                if !clean {
                    report.still_dirty += 1;
                }
            }
            Err(error) => {
                tracing::warn!("Failed to push {table}/{id}: {}", error);
                report.failures.push(PushFailure {
                    table,
                    id: id.clone(),
                    error: error.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn push_suggestion(
        &self,
        suggestion: &CourseSuggestion,
        report: &mut PushReport,
    ) -> Result<()> {
        let draft = SuggestionDraft::from(suggestion);
        let result = self
            .gateway
            .submit_suggestion(&draft)
            .await
            .and_then(|confirmed| {
                if confirmed.server_updated_at.is_some() {
                    Ok(confirmed)
                } else {
                    Err(NetworkError::Decode(format!(
                        "suggestion {} has no version",
                        suggestion.id
                    )))
                }
            });

        match result {
            Ok(confirmed) => {
                self.db
                    .confirm_submission(&suggestion.id, &confirmed)
                    .await?;
                report.pushed += 1;
            }
            Err(error) => {
                tracing::warn!("Failed to submit suggestion {}: {}", suggestion.id, error);
                report.failures.push(PushFailure {
                    table: SyncTable::CourseSuggestions,
                    id: suggestion.id.clone(),
                    error: error.to_string(),
                });
            }
        }
        Ok(())
    }

    // -- pull ---------------------------------------------------------------

    /// Apply server changes. The first network failure stops the phase and
    /// is recorded in the report; its checkpoint is left untouched.
    pub async fn pull(&self) -> Result<PullReport> {
        let mut report = PullReport::default();
        match self.pull_collections(&mut report).await {
            Ok(()) => {}
            Err(Error::Network(error)) => {
                tracing::warn!("Pull failed: {}", error);
                report.error = Some(error.to_string());
            }
            Err(error) => return Err(error),
        }
        Ok(report)
    }

    async fn pull_collections(&self, report: &mut PullReport) -> Result<()> {
        report.courses = self.pull_courses().await?;
        if !self.session.is_authenticated() {
            return Ok(());
        }
        report.suggestions = self.pull_suggestions().await?;
        report.visits = self.pull_visits().await?;
        report.wishlist = self.pull_wishlist().await?;
        Ok(())
    }

    async fn pull_courses(&self) -> Result<MergeOutcome> {
        let since = self.db.get_checkpoint(COURSES_COLLECTION).await?;
        let rows = self.gateway.course_delta(since).await?;
        let outcome = self.db.upsert_courses(&rows).await?;

        if let Some(latest) = rows.iter().map(|row| row.course.version()).max() {
            self.db
                .advance_checkpoint(COURSES_COLLECTION, latest)
                .await?;
        }
        tracing::debug!("Pulled {} course(s) since {:?}", rows.len(), since);
        Ok(outcome)
    }

    async fn pull_suggestions(&self) -> Result<MergeOutcome> {
        let since = self.db.get_checkpoint(SUGGESTIONS_COLLECTION).await?;
        let rows = self.gateway.suggestion_delta(since).await?;
        let outcome = self.db.upsert_suggestions(&rows).await?;

        if let Some(latest) = rows.iter().map(CourseSuggestion::version).max() {
            self.db
                .advance_checkpoint(SUGGESTIONS_COLLECTION, latest)
                .await?;
        }
        Ok(outcome)
    }

    async fn pull_visits(&self) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();
        let mut seen: HashSet<EntityId> = HashSet::new();
        let mut offset = 0;

        loop {
            let filter = VisitFilter {
                limit: Some(VISIT_PAGE_SIZE),
                offset: Some(offset),
                ..VisitFilter::default()
            };
            let page = self.gateway.list_visits(&filter).await?;
            let fresh = page
                .iter()
                .filter(|visit| seen.insert(visit.id.clone()))
                .count();
            if fresh == 0 && !page.is_empty() {
                tracing::warn!("Visit page at offset {} repeats earlier rows; stopping", offset);
                break;
            }
            self.ensure_courses(page.iter().map(|visit| &visit.course_id))
                .await?;
            outcome.absorb(self.db.merge_remote_visits(&page).await?);

            if page.len() < VISIT_PAGE_SIZE as usize {
                break;
            }
            offset += VISIT_PAGE_SIZE;
        }
        Ok(outcome)
    }

    async fn pull_wishlist(&self) -> Result<MergeOutcome> {
        let entries = self.gateway.list_wishlist().await?;
        self.ensure_courses(entries.iter().map(|entry| &entry.course_id))
            .await?;
        self.db.merge_remote_wishlist(&entries).await
    }

    /// Fetch details for referenced courses missing from the local catalog.
    async fn ensure_courses<'a>(
        &self,
        course_ids: impl Iterator<Item = &'a EntityId>,
    ) -> Result<()> {
        let unique: BTreeSet<&EntityId> = course_ids.collect();
        for course_id in unique {
            if self.db.course_exists(course_id).await? {
                continue;
            }
            match self.gateway.get_course(course_id).await {
                Ok(detail) => {
                    self.db.upsert_courses(&[detail]).await?;
                }
                Err(error) if error.is_not_found() => {
                    tracing::debug!(course_id = %course_id, "Referenced course is gone");
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }

    // -- runner -------------------------------------------------------------

    /// Consume triggers until every sender is dropped.
    ///
    /// Triggers queued while a cycle runs are folded into it. If they left
    /// local changes behind, one follow-up cycle runs. A failed cycle
    /// schedules a [`SyncTrigger::Retry`] with exponential backoff; any
    /// success resets it.
    pub async fn run(self: Arc<Self>, mut triggers: mpsc::Receiver<SyncTrigger>) {
        let mut consecutive_failures: u32 = 0;
        let mut retry_at: Option<Instant> = None;
        let mut follow_up: Option<SyncTrigger> = None;

        loop {
            let trigger = if let Some(trigger) = follow_up.take() {
                trigger
            } else {
                match retry_at {
                    Some(deadline) => tokio::select! {
                        received = triggers.recv() => match received {
                            Some(trigger) => trigger,
                            None => break,
                        },
                        () = tokio::time::sleep_until(deadline) => SyncTrigger::Retry,
                    },
                    None => match triggers.recv().await {
                        Some(trigger) => trigger,
                        None => break,
                    },
                }
            };

            let outcome = self.sync_now(trigger).await;
            let coalesced = drain_triggers(&mut triggers);
            let succeeded = match outcome {
                Ok(None) => continue,
                Ok(Some(report)) => report.is_success(),
                Err(_) => false,
            };

            if succeeded {
                consecutive_failures = 0;
                retry_at = None;
                if let Some(trigger) = coalesced {
                    if self.status().pending_changes > 0 {
                        tracing::debug!("Local changes queued during the cycle; syncing again");
                        follow_up = Some(trigger);
                    }
                }
            } else {
                consecutive_failures = consecutive_failures.saturating_add(1);
                let delay = backoff_delay(consecutive_failures);
                tracing::info!(
                    "Retrying sync in {}s (attempt {})",
                    delay.as_secs(),
                    consecutive_failures
                );
                retry_at = Some(Instant::now() + delay);
            }
        }
        tracing::debug!("Sync runner stopped");
    }
}

/// Discard every queued trigger, returning the most recent one.
fn drain_triggers(triggers: &mut mpsc::Receiver<SyncTrigger>) -> Option<SyncTrigger> {
    let mut latest = None;
    while let Ok(trigger) = triggers.try_recv() {
        latest = Some(trigger);
    }
    if latest.is_some() {
        tracing::debug!("Coalesced queued sync triggers into the finished cycle");
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSession;
    use crate::db::fixtures::{date, detail, ts};
    use crate::gateway::fake::FakeGateway;
    use crate::models::{HolesPlayed, Role, UserProfile, VisitPatch};
    use crate::query::{CacheScope, QueryKey};
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    fn profile() -> UserProfile {
        UserProfile {
            id: EntityId::from("u1"),
            email: "golfer@example.com".to_string(),
            display_name: "Golfer".to_string(),
            role: Role::User,
            public_slug: "golfer".to_string(),
        }
    }

    fn user() -> EntityId {
        EntityId::from("u1")
    }

    async fn setup() -> (Arc<SyncEngine>, DatabaseService, FakeGateway) {
        let db = DatabaseService::open_in_memory().await.unwrap();
        db.upsert_courses(&[detail("c1", "2024-01-01", &[("t1", Some(72))])])
            .await
            .unwrap();

        let gateway = FakeGateway::default();
        gateway.state().user = Some(profile());
        let session = Session::with_auth(AuthSession {
            token: "token".to_string(),
            user: profile(),
        });
        let engine = SyncEngine::new(db.clone(), Arc::new(gateway.clone()), session);
        (Arc::new(engine), db, gateway)
    }

    fn draft(id: &str, course: &str, day: &str) -> VisitDraft {
        VisitDraft {
            id: EntityId::from(id),
            ..VisitDraft::new(EntityId::from(course), date(day), HolesPlayed::Eighteen)
        }
    }

    fn remote_visit(id: &str, course: &str, version: &str) -> Visit {
        let mut visit = Visit::from_draft(user(), draft(id, course, "2024-04-01"));
        visit.is_dirty = false;
        visit.server_updated_at = Some(ts(version));
        visit
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_create_is_pushed_once_and_cleaned() {
        let (engine, db, gateway) = setup().await;
        let created = db
            .create_visit(&user(), draft("v1", "c1", "2024-05-01"))
            .await
            .unwrap();
        assert!(created.is_dirty);
        assert!(created.server_updated_at.is_none());

        let report = engine.sync_now(SyncTrigger::Manual).await.unwrap().unwrap();
        assert!(report.is_success());
        assert_eq!(gateway.writes(), vec!["POST /api/visits".to_string()]);

        let synced = db.get_visit(&EntityId::from("v1")).await.unwrap().unwrap();
        assert!(!synced.is_dirty);
        assert_eq!(
            synced.server_updated_at,
            gateway.state().visits[0].server_updated_at
        );
        assert_eq!(engine.status().phase, SyncPhase::Idle);
        assert_eq!(engine.status().pending_changes, 0);
        assert!(engine.status().last_success_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_push_without_changes_sends_nothing() {
        let (engine, db, gateway) = setup().await;
        db.create_visit(&user(), draft("v1", "c1", "2024-05-01"))
            .await
            .unwrap();
        db.add_wishlist_entry(&user(), &EntityId::from("c1"))
            .await
            .unwrap();

        let first = engine.push().await.unwrap();
        assert_eq!(first.pushed, 2);
        gateway.clear_calls();

        let second = engine.push().await.unwrap();
        assert_eq!(second, PushReport::default());
        assert!(gateway.writes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deletes_are_removed_only_after_acknowledgement() {
        let (engine, db, gateway) = setup().await;
        db.create_visit(&user(), draft("v1", "c1", "2024-05-01"))
            .await
            .unwrap();
        engine.push().await.unwrap();
        db.soft_delete_visit(&EntityId::from("v1")).await.unwrap();

        gateway.fail("delete_visit", NetworkError::Timeout);
        let report = engine.sync_now(SyncTrigger::Manual).await.unwrap().unwrap();
        assert_eq!(report.push.failures.len(), 1);
        assert_eq!(engine.status().phase, SyncPhase::Failed);
        assert_eq!(db.list_dirty_visits().await.unwrap().len(), 1);

        gateway.recover("delete_visit");
        let report = engine.sync_now(SyncTrigger::Retry).await.unwrap().unwrap();
        assert!(report.is_success());
        assert!(db.list_dirty_visits().await.unwrap().is_empty());
        assert!(gateway.state().visits.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_of_missing_remote_row_counts_as_success() {
        let (engine, db, gateway) = setup().await;
        let entry = db
            .add_wishlist_entry(&user(), &EntityId::from("c1"))
            .await
            .unwrap();
        db.remove_wishlist_entry(&user(), &EntityId::from("c1"))
            .await
            .unwrap();

        let report = engine.push().await.unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(gateway.writes(), vec!["DELETE /api/wishlist/c1".to_string()]);
        assert!(db.list_dirty_wishlist_entries().await.unwrap().is_empty());
        assert!(db.list_wishlist(&entry.user_id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn removing_unlisted_course_touches_nothing() {
        let (engine, db, gateway) = setup().await;
        let removed = db
            .remove_wishlist_entry(&user(), &EntityId::from("c1"))
            .await
            .unwrap();
        assert!(removed.is_none());

        engine.push().await.unwrap();
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_during_push_keeps_row_dirty() {
        let (engine, db, gateway) = setup().await;
        db.create_visit(&user(), draft("v1", "c1", "2024-05-01"))
            .await
            .unwrap();
        gateway.state().edit_during_create = Some((
            db.clone(),
            EntityId::from("v1"),
            VisitPatch {
                gross_score: Some(79),
                ..VisitPatch::default()
            },
        ));

        let report = engine.push().await.unwrap();
        assert_eq!(report.still_dirty, 1);

        let visit = db.get_visit(&EntityId::from("v1")).await.unwrap().unwrap();
        assert!(visit.is_dirty);
        assert!(visit.server_updated_at.is_some());
        assert_eq!(visit.gross_score, Some(79));

        gateway.clear_calls();
        engine.push().await.unwrap();
        assert_eq!(gateway.writes(), vec!["PATCH /api/me/visits/v1".to_string()]);
        let visit = db.get_visit(&EntityId::from("v1")).await.unwrap().unwrap();
        assert!(!visit.is_dirty);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_advances_checkpoint_to_latest_version() {
        let (engine, db, gateway) = setup().await;
        db.advance_checkpoint(COURSES_COLLECTION, ts("2024-01-01"))
            .await
            .unwrap();
        gateway.state().course_delta = vec![
            detail("c2", "2024-02-01", &[]),
            detail("c3", "2024-03-01", &[]),
        ];

        let report = engine.pull().await.unwrap();
        assert_eq!(report.courses.applied, 2);
        assert_eq!(
            db.get_checkpoint(COURSES_COLLECTION).await.unwrap(),
            Some(ts("2024-03-01"))
        );

        gateway.state().course_delta.clear();
        engine.pull().await.unwrap();
        assert_eq!(
            db.get_checkpoint(COURSES_COLLECTION).await.unwrap(),
            Some(ts("2024-03-01"))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pull_failure_keeps_checkpoint_and_fails_cycle() {
        let (engine, db, gateway) = setup().await;
        db.advance_checkpoint(COURSES_COLLECTION, ts("2024-01-01"))
            .await
            .unwrap();
        gateway.state().course_delta = vec![detail("c2", "2024-02-01", &[])];
        gateway.fail(
            "course_delta",
            NetworkError::Status {
                status: 503,
                body: "maintenance (503)".to_string(),
            },
        );

        let report = engine.sync_now(SyncTrigger::Foreground).await.unwrap().unwrap();
        assert!(report.pull.error.is_some());
        assert_eq!(
            db.get_checkpoint(COURSES_COLLECTION).await.unwrap(),
            Some(ts("2024-01-01"))
        );
        let status = engine.status();
        assert_eq!(status.phase, SyncPhase::Failed);
        assert!(status.last_error.unwrap().contains("pull failed"));
        assert!(gateway
            .calls()
            .iter()
            .all(|call| !call.starts_with("GET /api/me/")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dirty_local_visit_wins_over_older_pull() {
        let (engine, db, gateway) = setup().await;
        db.create_visit(&user(), draft("v1", "c1", "2024-05-01"))
            .await
            .unwrap();
        db.mark_synced(SyncTable::Visits, &EntityId::from("v1"), ts("2024-05-10"))
            .await
            .unwrap();
        db.update_visit(
            &EntityId::from("v1"),
            VisitPatch {
                gross_score: Some(81),
                ..VisitPatch::default()
            },
        )
        .await
        .unwrap();
        gateway.state().visits = vec![remote_visit("v1", "c1", "2024-05-01")];

        let report = engine.pull().await.unwrap();
        assert_eq!(report.visits.conflicts, 1);

        let visit = db.get_visit(&EntityId::from("v1")).await.unwrap().unwrap();
        assert_eq!(visit.gross_score, Some(81));
        assert!(visit.is_dirty);
        assert_eq!(db.list_conflicts(10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pulled_visit_for_unknown_course_fetches_it() {
        let (engine, db, gateway) = setup().await;
        {
            let mut state = gateway.state();
            state.courses.insert(
                EntityId::from("c9"),
                detail("c9", "2024-02-01", &[("t9", Some(70))]),
            );
            state.visits = vec![
                remote_visit("v9", "c9", "2024-05-01"),
                remote_visit("v8", "gone", "2024-05-01"),
            ];
        }

        let report = engine.pull().await.unwrap();
        assert_eq!(report.visits.applied, 1);
        assert_eq!(report.visits.skipped, 1);
        assert!(db.course_exists(&EntityId::from("c9")).await.unwrap());
        assert!(db.get_visit(&EntityId::from("v9")).await.unwrap().is_some());
        assert!(!db.course_exists(&EntityId::from("gone")).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn trigger_during_cycle_is_coalesced() {
        let (engine, _db, gateway) = setup().await;
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        gateway.state().hold_course_delta = Some((Arc::clone(&entered), Arc::clone(&release)));

        let running = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.sync_now(SyncTrigger::Foreground).await }
        });
        entered.notified().await;

        assert!(engine.is_running());
        assert!(engine.status().is_syncing());
        assert_eq!(engine.sync_now(SyncTrigger::Manual).await.unwrap(), None);

        release.notify_one();
        let report = running.await.unwrap().unwrap();
        assert!(report.is_some());
        assert!(!engine.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn anonymous_cycle_only_pulls_the_catalog() {
        let db = DatabaseService::open_in_memory().await.unwrap();
        let gateway = FakeGateway::default();
        let engine = SyncEngine::new(db, Arc::new(gateway.clone()), Session::new());

        let report = engine.sync_now(SyncTrigger::Manual).await.unwrap().unwrap();
        assert!(report.is_success());
        assert_eq!(gateway.calls(), vec!["GET /api/courses/delta".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submitted_suggestions_are_confirmed() {
        let (engine, db, gateway) = setup().await;
        db.create_suggestion(
            &user(),
            SuggestionDraft {
                id: EntityId::from("s1"),
                name: "Kingsbarns".to_string(),
                address1: "Kingsbarns".to_string(),
                address2: None,
                city: "St Andrews".to_string(),
                state_region: None,
                country: "GB".to_string(),
                postal_code: None,
                phone: None,
                website: None,
            },
        )
        .await
        .unwrap();

        let report = engine.push().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert_eq!(
            gateway.writes(),
            vec!["POST /api/course-suggestions".to_string()]
        );
        assert!(db.list_pending_submissions().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runner_retries_failed_cycles() {
        let (engine, _db, gateway) = setup().await;
        gateway.fail("course_delta", NetworkError::Connectivity("offline".to_string()));
        let mut status = engine.subscribe();

        let (sender, receiver) = crate::sync::trigger_channel();
        let runner = tokio::spawn(Arc::clone(&engine).run(receiver));
        sender.send(SyncTrigger::Reconnect).await.unwrap();

        status
            .wait_for(|status| status.phase == SyncPhase::Failed)
            .await
            .unwrap();

        gateway.recover("course_delta");
        tokio::time::timeout(
            std::time::Duration::from_secs(10),
            status.wait_for(|status| status.last_success_at.is_some()),
        )
        .await
        .unwrap()
        .unwrap();

        drop(sender);
        runner.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn background_sync_clears_cached_queries() {
        let (engine, _db, _gateway) = setup().await;
        engine
            .session
            .cache()
            .insert(QueryKey::new(CacheScope::Stats, "overview"), 3_i64);
        let mut status = engine.subscribe();

        let (sender, receiver) = crate::sync::trigger_channel();
        let runner = tokio::spawn(Arc::clone(&engine).run(receiver));
        sender.send(SyncTrigger::Reconnect).await.unwrap();

        tokio::time::timeout(
            std::time::Duration::from_secs(10),
            status.wait_for(|status| status.last_success_at.is_some()),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(engine.session.cache().is_empty());

        drop(sender);
        runner.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_cycle_keeps_cached_queries() {
        let (engine, _db, gateway) = setup().await;
        gateway.fail("course_delta", NetworkError::Timeout);
        engine
            .session
            .cache()
            .insert(QueryKey::new(CacheScope::Stats, "overview"), 3_i64);

        let report = engine.sync_now(SyncTrigger::Manual).await.unwrap().unwrap();
        assert!(!report.is_success());
        assert_eq!(engine.session.cache().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runner_folds_triggers_queued_during_a_cycle() {
        let (engine, _db, gateway) = setup().await;
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        gateway.state().hold_course_delta = Some((Arc::clone(&entered), Arc::clone(&release)));

        let (sender, receiver) = crate::sync::trigger_channel();
        let runner = tokio::spawn(Arc::clone(&engine).run(receiver));
        sender.send(SyncTrigger::Foreground).await.unwrap();
        entered.notified().await;

        for _ in 0..5 {
            sender.send(SyncTrigger::Manual).await.unwrap();
        }
        gateway.state().hold_course_delta = None;
        release.notify_one();

        drop(sender);
        tokio::time::timeout(std::time::Duration::from_secs(10), runner)
            .await
            .unwrap()
            .unwrap();

        let cycles = gateway
            .calls()
            .iter()
            .filter(|call| call.as_str() == "GET /api/courses/delta")
            .count();
        assert_eq!(cycles, 1);
        assert!(engine.status().last_success_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn visit_pull_stops_when_pages_repeat() {
        let (engine, db, gateway) = setup().await;
        {
            let mut state = gateway.state();
            state.ignore_visit_offset = true;
            state.visits = (0..150)
                .map(|index| remote_visit(&format!("v{index}"), "c1", "2024-05-01"))
                .collect();
        }

        let report = tokio::time::timeout(std::time::Duration::from_secs(10), engine.pull())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.visits.applied, 100);
        let pages = gateway
            .calls()
            .iter()
            .filter(|call| call.as_str() == "GET /api/me/visits")
            .count();
        assert_eq!(pages, 2);
        assert_eq!(
            db.list_visits(&user(), &VisitFilter::default())
                .await
                .unwrap()
                .len(),
            100
        );
    }
}
