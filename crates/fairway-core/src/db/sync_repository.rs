//! Sync bookkeeping: checkpoints, push acknowledgements and the conflict log

use chrono::{DateTime, Utc};
use libsql::{Connection, Row, Value};

use super::store::{self, RowResult};
use super::SyncTable;
use crate::error::{Error, Result};
use crate::models::{EntityId, SyncConflict};

const LWW_STRATEGY: &str = "lww";

/// Trait for sync state storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncRepository {
    /// Last pulled version of a collection
    async fn get_checkpoint(&self, collection: &str) -> Result<Option<DateTime<Utc>>>;

    /// Move a checkpoint forward to `observed`; never moves it back.
    ///
    /// Returns the checkpoint now stored.
    async fn advance_checkpoint(
        &self,
        collection: &str,
        observed: DateTime<Utc>,
    ) -> Result<DateTime<Utc>>;

    /// Log a pulled row skipped by last-write-wins
    async fn record_conflict(
        &self,
        table: SyncTable,
        row_id: &str,
        local_version: Option<DateTime<Utc>>,
        incoming_version: DateTime<Utc>,
    ) -> Result<()>;

    /// Most recent conflicts first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;

    /// Acknowledge a pushed row: clear dirty and store the server version.
    ///
    /// Soft-deleted rows are physically removed.
    async fn mark_synced(
        &self,
        table: SyncTable,
        id: &EntityId,
        server_updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Like [`SyncRepository::mark_synced`], but only clears dirty when the row
    /// still has the pushed `revision`. Returns whether the row is now clean.
    async fn mark_synced_at_revision(
        &self,
        table: SyncTable,
        id: &EntityId,
        server_updated_at: DateTime<Utc>,
        revision: i64,
    ) -> Result<bool>;

    /// Rows waiting to be pushed
    async fn pending_changes(&self) -> Result<u64>;
}

/// libSQL implementation of `SyncRepository`
pub struct LibSqlSyncRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn checkpoint_key(collection: &str) -> String {
        format!("checkpoint:{collection}")
    }

    fn tracked_table(table: SyncTable) -> Result<&'static str> {
        if table.tracks_local_changes() {
            Ok(table.table_name())
        } else {
            Err(Error::Validation(format!(
                "table '{table}' has no local changes to acknowledge"
            )))
        }
    }
}

impl SyncRepository for LibSqlSyncRepository<'_> {
    async fn get_checkpoint(&self, collection: &str) -> Result<Option<DateTime<Utc>>> {
        let raw = store::query_optional(
            self.conn,
            "SELECT value FROM sync_state WHERE key = ?",
            vec![store::text(Self::checkpoint_key(collection))],
            |row| Ok(row.get::<String>(0)?),
        )
        .await?;

        Ok(raw.and_then(|raw| {
            let parsed = store::parse_timestamp(&raw);
            if parsed.is_none() {
                tracing::warn!("Ignoring unreadable checkpoint for {collection}: {raw}");
            }
            parsed
        }))
    }

    async fn advance_checkpoint(
        &self,
        collection: &str,
        observed: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let current = self.get_checkpoint(collection).await?;
        let next = current.map_or(observed, |current| current.max(observed));

        if current != Some(next) {
            store::execute(
                self.conn,
                "INSERT INTO sync_state (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                vec![
                    store::text(Self::checkpoint_key(collection)),
                    store::timestamp(&next),
                ],
            )
            .await?;
            tracing::debug!("Checkpoint for {collection} advanced to {next}");
        }
        Ok(next)
    }

    async fn record_conflict(
        &self,
        table: SyncTable,
        row_id: &str,
        local_version: Option<DateTime<Utc>>,
        incoming_version: DateTime<Utc>,
    ) -> Result<()> {
        let (sql, params) = conflict_statement(table, row_id, local_version, incoming_version);
        store::execute(self.conn, &sql, params).await?;
        Ok(())
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        store::query_map(
            self.conn,
            "SELECT id, table_name, row_id, local_version, incoming_version, resolved_at, strategy
             FROM sync_conflicts
             ORDER BY id DESC
             LIMIT ?",
            vec![store::integer(i64::try_from(limit).unwrap_or(i64::MAX))],
            parse_conflict,
        )
        .await
    }

    async fn mark_synced(
        &self,
        table: SyncTable,
        id: &EntityId,
        server_updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let table_name = Self::tracked_table(table)?;

        let removed = store::execute(
            self.conn,
            &format!("DELETE FROM {table_name} WHERE id = ? AND is_deleted = 1"),
            vec![store::id(id)],
        )
        .await?;
        if removed.rows_affected > 0 {
            tracing::debug!("Removed acknowledged delete {table_name}/{id}");
            return Ok(());
        }

        let updated = store::execute(
            self.conn,
            &format!("UPDATE {table_name} SET is_dirty = 0, server_updated_at = ? WHERE id = ?"),
            vec![store::timestamp(&server_updated_at), store::id(id)],
        )
        .await?;
        if updated.rows_affected == 0 {
            return Err(Error::NotFound(format!("{table_name}/{id}")));
        }
        Ok(())
    }

    async fn mark_synced_at_revision(
        &self,
        table: SyncTable,
        id: &EntityId,
        server_updated_at: DateTime<Utc>,
        revision: i64,
    ) -> Result<bool> {
        let table_name = Self::tracked_table(table)?;

        let removed = store::execute(
            self.conn,
            &format!("DELETE FROM {table_name} WHERE id = ? AND is_deleted = 1 AND revision = ?"),
            vec![store::id(id), store::integer(revision)],
        )
        .await?;
        if removed.rows_affected > 0 {
            return Ok(true);
        }

        let cleared = store::execute(
            self.conn,
            &format!(
                "UPDATE {table_name} SET is_dirty = 0, server_updated_at = ?
                 WHERE id = ? AND revision = ?"
            ),
            vec![
                store::timestamp(&server_updated_at),
                store::id(id),
                store::integer(revision),
            ],
        )
        .await?;
        if cleared.rows_affected > 0 {
            return Ok(true);
        }

        // Edited while the push was in flight: keep it dirty for the next cycle
        let recorded = store::execute(
            self.conn,
            &format!("UPDATE {table_name} SET server_updated_at = ? WHERE id = ?"),
            vec![store::timestamp(&server_updated_at), store::id(id)],
        )
        .await?;
        if recorded.rows_affected == 0 {
            return Err(Error::NotFound(format!("{table_name}/{id}")));
        }
        tracing::debug!("{table_name}/{id} changed during push; left dirty");
        Ok(false)
    }

    async fn pending_changes(&self) -> Result<u64> {
        let count = store::query_optional(
            self.conn,
            "SELECT
                (SELECT COUNT(*) FROM visits WHERE is_dirty = 1)
              + (SELECT COUNT(*) FROM wishlist_entries WHERE is_dirty = 1)
              + (SELECT COUNT(*) FROM course_suggestions WHERE server_updated_at IS NULL)",
            Vec::new(),
            |row| Ok(row.get::<i64>(0)?),
        )
        .await?;
        Ok(count.map_or(0, |count| u64::try_from(count).unwrap_or(0)))
    }
}

/// Insert statement for a conflict log entry
pub(crate) fn conflict_statement(
    table: SyncTable,
    row_id: &str,
    local_version: Option<DateTime<Utc>>,
    incoming_version: DateTime<Utc>,
) -> (String, Vec<Value>) {
    (
        "INSERT INTO sync_conflicts (
            table_name, row_id, local_version, incoming_version, resolved_at, strategy
        ) VALUES (?, ?, ?, ?, ?, ?)"
            .to_string(),
        vec![
            store::text(table.table_name()),
            store::text(row_id),
            store::opt_timestamp(local_version.as_ref()),
            store::timestamp(&incoming_version),
            store::timestamp(&Utc::now()),
            store::text(LWW_STRATEGY),
        ],
    )
}

fn parse_conflict(row: &Row) -> RowResult<SyncConflict> {
    Ok(SyncConflict {
        id: row.get(0)?,
        table_name: row.get(1)?,
        row_id: row.get(2)?,
        local_version: store::read_opt_timestamp(row, 3)?,
        incoming_version: store::read_timestamp(row, 4)?,
        resolved_at: store::read_timestamp(row, 5)?,
        strategy: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{date, detail, ts};
    use crate::db::{
        CourseRepository, Database, LibSqlCourseRepository, LibSqlVisitRepository,
        VisitRepository,
    };
    use crate::models::{HolesPlayed, VisitDraft, VisitPatch};

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        LibSqlCourseRepository::new(db.connection())
            .upsert_courses(&[detail("c1", "2024-01-01", &[])])
            .await
            .unwrap();
        db
    }

    fn draft(id: &str) -> VisitDraft {
        VisitDraft {
            id: EntityId::from(id),
            ..VisitDraft::new(EntityId::from("c1"), date("2024-05-01"), HolesPlayed::Eighteen)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_checkpoint_never_moves_back() {
        let db = setup().await;
        let repo = LibSqlSyncRepository::new(db.connection());

        assert_eq!(repo.get_checkpoint("courses").await.unwrap(), None);

        repo.advance_checkpoint("courses", ts("2024-03-01"))
            .await
            .unwrap();
        let kept = repo
            .advance_checkpoint("courses", ts("2024-02-01"))
            .await
            .unwrap();
        assert_eq!(kept, ts("2024-03-01"));
        assert_eq!(
            repo.get_checkpoint("courses").await.unwrap(),
            Some(ts("2024-03-01"))
        );
        assert_eq!(repo.get_checkpoint("course_suggestions").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_removes_soft_deleted_rows_only_then() {
        let db = setup().await;
        let visits = LibSqlVisitRepository::new(db.connection());
        let sync = LibSqlSyncRepository::new(db.connection());
        let user = EntityId::from("u1");

        visits.create_visit(&user, draft("v1")).await.unwrap();
        visits.soft_delete_visit(&EntityId::from("v1")).await.unwrap();

        let pending = visits.list_dirty_visits().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_deleted);

        sync.mark_synced(SyncTable::Visits, &EntityId::from("v1"), ts("2024-05-02"))
            .await
            .unwrap();
        assert!(visits.list_dirty_visits().await.unwrap().is_empty());
        let remaining = db
            .query_map("SELECT COUNT(*) FROM visits", Vec::new(), |row| {
                Ok(row.get::<i64>(0)?)
            })
            .await
            .unwrap();
        assert_eq!(remaining, vec![0]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_revision_guard_keeps_newer_edit_dirty() {
        let db = setup().await;
        let visits = LibSqlVisitRepository::new(db.connection());
        let sync = LibSqlSyncRepository::new(db.connection());
        let user = EntityId::from("u1");

        let created = visits.create_visit(&user, draft("v1")).await.unwrap();
        let pushed_revision = created.revision;

        visits
            .update_visit(
                &created.id,
                VisitPatch {
                    gross_score: Some(79),
                    ..VisitPatch::default()
                },
            )
            .await
            .unwrap();

        let clean = sync
            .mark_synced_at_revision(SyncTable::Visits, &created.id, ts("2024-05-02"), pushed_revision)
            .await
            .unwrap();
        assert!(!clean);

        let stored = visits.get_visit(&created.id).await.unwrap().unwrap();
        assert!(stored.is_dirty);
        assert_eq!(stored.server_updated_at, Some(ts("2024-05-02")));
        assert_eq!(stored.gross_score, Some(79));

        let clean = sync
            .mark_synced_at_revision(SyncTable::Visits, &created.id, ts("2024-05-03"), stored.revision)
            .await
            .unwrap();
        assert!(clean);
        assert!(!visits.get_visit(&created.id).await.unwrap().unwrap().is_dirty);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_rejects_untracked_tables_and_unknown_rows() {
        let db = setup().await;
        let sync = LibSqlSyncRepository::new(db.connection());

        assert!(matches!(
            sync.mark_synced(SyncTable::Courses, &EntityId::from("c1"), ts("2024-01-01"))
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            sync.mark_synced(SyncTable::Visits, &EntityId::from("nope"), ts("2024-01-01"))
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_changes_counts_every_collection() {
        let db = setup().await;
        let visits = LibSqlVisitRepository::new(db.connection());
        let sync = LibSqlSyncRepository::new(db.connection());

        visits
            .create_visit(&EntityId::from("u1"), draft("v1"))
            .await
            .unwrap();
        assert_eq!(sync.pending_changes().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflicts_listed_newest_first() {
        let db = setup().await;
        let sync = LibSqlSyncRepository::new(db.connection());

        sync.record_conflict(SyncTable::Visits, "v1", None, ts("2024-01-01"))
            .await
            .unwrap();
        sync.record_conflict(
            SyncTable::WishlistEntries,
            "w1",
            Some(ts("2024-02-02")),
            ts("2024-02-01"),
        )
        .await
        .unwrap();

        let conflicts = sync.list_conflicts(1).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].row_id, "w1");
        assert_eq!(conflicts[0].strategy, "lww");
    }
}
