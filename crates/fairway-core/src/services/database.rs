//! Shared database service wrapper used by the sync engine, the query
//! client and the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::{
    CourseRepository, Database, LibSqlCourseRepository, LibSqlSuggestionRepository,
    LibSqlSyncRepository, LibSqlVisitRepository, LibSqlWishlistRepository, MergeOutcome,
    SuggestionRepository, SyncRepository, SyncTable, VisitRepository, WishlistRepository,
};
use crate::models::{
    Course, CourseDetail, CourseSearchParams, CourseSuggestion, EntityId, SuggestionDraft,
    SuggestionStatus, SyncConflict, Visit, VisitDraft, VisitFilter, VisitPatch, VisitedCourse,
    WishlistEntry,
};
use crate::Result;

/// Thread-safe service for DB and repository operations.
///
/// Every call takes the connection lock for its whole duration, so
/// repository operations never interleave.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable ({}); starting from a fresh file",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory databases.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("fairway.db");
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        // WAL and shared-memory sidecars belong to the old file
        for suffix in ["-wal", "-shm"] {
            let sidecar = parent.join(format!("{base_name}{suffix}"));
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
                tracing::warn!("Removed stale sidecar file {}", sidecar.display());
            }
        }

        Ok(())
    }

    // -- courses ------------------------------------------------------------

    /// Store pulled or fetched course details.
    pub async fn upsert_courses(&self, rows: &[CourseDetail]) -> Result<MergeOutcome> {
        let db = self.db.lock().await;
        LibSqlCourseRepository::new(db.connection())
            .upsert_courses(rows)
            .await
    }

    /// Store course rows from a list response.
    pub async fn upsert_course_summaries(&self, rows: &[Course]) -> Result<MergeOutcome> {
        let db = self.db.lock().await;
        LibSqlCourseRepository::new(db.connection())
            .upsert_course_summaries(rows)
            .await
    }

    pub async fn get_course(&self, id: &EntityId) -> Result<Option<Course>> {
        let db = self.db.lock().await;
        LibSqlCourseRepository::new(db.connection())
            .get_course(id)
            .await
    }

    pub async fn get_course_detail(&self, id: &EntityId) -> Result<Option<CourseDetail>> {
        let db = self.db.lock().await;
        LibSqlCourseRepository::new(db.connection())
            .get_course_detail(id)
            .await
    }

    /// Search the local catalog.
    pub async fn search_courses(&self, params: &CourseSearchParams) -> Result<Vec<Course>> {
        let db = self.db.lock().await;
        LibSqlCourseRepository::new(db.connection())
            .search_courses(params)
            .await
    }

    pub async fn course_exists(&self, id: &EntityId) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlCourseRepository::new(db.connection())
            .course_exists(id)
            .await
    }

    // -- visits -------------------------------------------------------------

    /// Record a visit offline.
    pub async fn create_visit(&self, user_id: &EntityId, draft: VisitDraft) -> Result<Visit> {
        let db = self.db.lock().await;
        LibSqlVisitRepository::new(db.connection())
            .create_visit(user_id, draft)
            .await
    }

    pub async fn update_visit(&self, id: &EntityId, patch: VisitPatch) -> Result<Visit> {
        let db = self.db.lock().await;
        LibSqlVisitRepository::new(db.connection())
            .update_visit(id, patch)
            .await
    }

    pub async fn soft_delete_visit(&self, id: &EntityId) -> Result<Visit> {
        let db = self.db.lock().await;
        LibSqlVisitRepository::new(db.connection())
            .soft_delete_visit(id)
            .await
    }

    pub async fn get_visit(&self, id: &EntityId) -> Result<Option<Visit>> {
        let db = self.db.lock().await;
        LibSqlVisitRepository::new(db.connection())
            .get_visit(id)
            .await
    }

    pub async fn list_visits(&self, user_id: &EntityId, filter: &VisitFilter) -> Result<Vec<Visit>> {
        let db = self.db.lock().await;
        LibSqlVisitRepository::new(db.connection())
            .list_visits(user_id, filter)
            .await
    }

    pub async fn list_visited_courses(&self, user_id: &EntityId) -> Result<Vec<VisitedCourse>> {
        let db = self.db.lock().await;
        LibSqlVisitRepository::new(db.connection())
            .list_visited_courses(user_id)
            .await
    }

    pub async fn list_dirty_visits(&self) -> Result<Vec<Visit>> {
        let db = self.db.lock().await;
        LibSqlVisitRepository::new(db.connection())
            .list_dirty_visits()
            .await
    }

    pub async fn merge_remote_visits(&self, visits: &[Visit]) -> Result<MergeOutcome> {
        let db = self.db.lock().await;
        LibSqlVisitRepository::new(db.connection())
            .merge_remote_visits(visits)
            .await
    }

    // -- wishlist -----------------------------------------------------------

    pub async fn add_wishlist_entry(
        &self,
        user_id: &EntityId,
        course_id: &EntityId,
    ) -> Result<WishlistEntry> {
        let db = self.db.lock().await;
        LibSqlWishlistRepository::new(db.connection())
            .add_wishlist_entry(user_id, course_id)
            .await
    }

    pub async fn remove_wishlist_entry(
        &self,
        user_id: &EntityId,
        course_id: &EntityId,
    ) -> Result<Option<WishlistEntry>> {
        let db = self.db.lock().await;
        LibSqlWishlistRepository::new(db.connection())
            .remove_wishlist_entry(user_id, course_id)
            .await
    }

    pub async fn list_wishlist(&self, user_id: &EntityId) -> Result<Vec<WishlistEntry>> {
        let db = self.db.lock().await;
        LibSqlWishlistRepository::new(db.connection())
            .list_wishlist(user_id)
            .await
    }

    pub async fn list_dirty_wishlist_entries(&self) -> Result<Vec<WishlistEntry>> {
        let db = self.db.lock().await;
        LibSqlWishlistRepository::new(db.connection())
            .list_dirty_wishlist_entries()
            .await
    }

    pub async fn merge_remote_wishlist(&self, entries: &[WishlistEntry]) -> Result<MergeOutcome> {
        let db = self.db.lock().await;
        LibSqlWishlistRepository::new(db.connection())
            .merge_remote_wishlist(entries)
            .await
    }

    // -- suggestions --------------------------------------------------------

    pub async fn create_suggestion(
        &self,
        user_id: &EntityId,
        draft: SuggestionDraft,
    ) -> Result<CourseSuggestion> {
        let db = self.db.lock().await;
        LibSqlSuggestionRepository::new(db.connection())
            .create_suggestion(user_id, draft)
            .await
    }

    pub async fn list_pending_submissions(&self) -> Result<Vec<CourseSuggestion>> {
        let db = self.db.lock().await;
        LibSqlSuggestionRepository::new(db.connection())
            .list_pending_submissions()
            .await
    }

    pub async fn confirm_submission(
        &self,
        local_id: &EntityId,
        confirmed: &CourseSuggestion,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSuggestionRepository::new(db.connection())
            .confirm_submission(local_id, confirmed)
            .await
    }

    pub async fn upsert_suggestions(&self, rows: &[CourseSuggestion]) -> Result<MergeOutcome> {
        let db = self.db.lock().await;
        LibSqlSuggestionRepository::new(db.connection())
            .upsert_suggestions(rows)
            .await
    }

    pub async fn list_suggestions(
        &self,
        submitted_by: Option<&EntityId>,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<CourseSuggestion>> {
        let db = self.db.lock().await;
        LibSqlSuggestionRepository::new(db.connection())
            .list_suggestions(submitted_by, status)
            .await
    }

    // -- sync state ---------------------------------------------------------

    pub async fn get_checkpoint(&self, collection: &str) -> Result<Option<DateTime<Utc>>> {
        let db = self.db.lock().await;
        LibSqlSyncRepository::new(db.connection())
            .get_checkpoint(collection)
            .await
    }

    pub async fn advance_checkpoint(
        &self,
        collection: &str,
        observed: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let db = self.db.lock().await;
        LibSqlSyncRepository::new(db.connection())
            .advance_checkpoint(collection, observed)
            .await
    }

    pub async fn record_conflict(
        &self,
        table: SyncTable,
        row_id: &str,
        local_version: Option<DateTime<Utc>>,
        incoming_version: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncRepository::new(db.connection())
            .record_conflict(table, row_id, local_version, incoming_version)
            .await
    }

    /// List recently resolved sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        LibSqlSyncRepository::new(db.connection())
            .list_conflicts(limit)
            .await
    }

    pub async fn mark_synced(
        &self,
        table: SyncTable,
        id: &EntityId,
        server_updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncRepository::new(db.connection())
            .mark_synced(table, id, server_updated_at)
            .await
    }

    pub async fn mark_synced_at_revision(
        &self,
        table: SyncTable,
        id: &EntityId,
        server_updated_at: DateTime<Utc>,
        revision: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSyncRepository::new(db.connection())
            .mark_synced_at_revision(table, id, server_updated_at, revision)
            .await
    }

    /// Number of local changes waiting for push.
    pub async fn pending_changes(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlSyncRepository::new(db.connection())
            .pending_changes()
            .await
    }
}
