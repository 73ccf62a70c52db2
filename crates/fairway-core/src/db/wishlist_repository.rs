//! Wishlist repository implementation

use libsql::{Connection, Row};

use super::course_repository::{CourseRepository, LibSqlCourseRepository};
use super::store::{self, RowResult};
use super::sync_repository::conflict_statement;
use super::{MergeOutcome, SyncTable};
use crate::error::{Error, Result};
use crate::models::{EntityId, WishlistEntry};

const WISHLIST_COLUMNS: &str =
    "id, user_id, course_id, created_at, server_updated_at, is_dirty, is_deleted, revision";

/// Trait for wishlist storage operations (async)
#[allow(async_fn_in_trait)]
pub trait WishlistRepository {
    /// Add a course to the wishlist, returning the active entry if one exists
    async fn add_wishlist_entry(
        &self,
        user_id: &EntityId,
        course_id: &EntityId,
    ) -> Result<WishlistEntry>;

    /// Soft delete the active entry; `None` when the course is not wishlisted
    async fn remove_wishlist_entry(
        &self,
        user_id: &EntityId,
        course_id: &EntityId,
    ) -> Result<Option<WishlistEntry>>;

    /// Active entries, newest first
    async fn list_wishlist(&self, user_id: &EntityId) -> Result<Vec<WishlistEntry>>;

    /// Entries waiting to be pushed, in insertion order
    async fn list_dirty_wishlist_entries(&self) -> Result<Vec<WishlistEntry>>;

    /// Apply the server wishlist under last-write-wins, matching by course
    async fn merge_remote_wishlist(&self, entries: &[WishlistEntry]) -> Result<MergeOutcome>;
}

/// libSQL implementation of `WishlistRepository`
pub struct LibSqlWishlistRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlWishlistRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn active_entry(
        &self,
        user_id: &EntityId,
        course_id: &EntityId,
    ) -> Result<Option<WishlistEntry>> {
        store::query_optional(
            self.conn,
            &format!(
                "SELECT {WISHLIST_COLUMNS} FROM wishlist_entries
                 WHERE user_id = ? AND course_id = ? AND is_deleted = 0"
            ),
            vec![store::id(user_id), store::id(course_id)],
            parse_entry,
        )
        .await
    }

    /// Every row for the pair, pending deletes included
    async fn entries_for(
        &self,
        user_id: &EntityId,
        course_id: &EntityId,
    ) -> Result<Vec<WishlistEntry>> {
        store::query_map(
            self.conn,
            &format!(
                "SELECT {WISHLIST_COLUMNS} FROM wishlist_entries
                 WHERE user_id = ? AND course_id = ?
                 ORDER BY rowid"
            ),
            vec![store::id(user_id), store::id(course_id)],
            parse_entry,
        )
        .await
    }

    async fn find(&self, id: &EntityId) -> Result<Option<WishlistEntry>> {
        store::query_optional(
            self.conn,
            &format!("SELECT {WISHLIST_COLUMNS} FROM wishlist_entries WHERE id = ?"),
            vec![store::id(id)],
            parse_entry,
        )
        .await
    }
}

impl WishlistRepository for LibSqlWishlistRepository<'_> {
    async fn add_wishlist_entry(
        &self,
        user_id: &EntityId,
        course_id: &EntityId,
    ) -> Result<WishlistEntry> {
        if let Some(existing) = self.active_entry(user_id, course_id).await? {
            return Ok(existing);
        }
        if !LibSqlCourseRepository::new(self.conn)
            .course_exists(course_id)
            .await?
        {
            return Err(Error::Validation(format!("Course {course_id} does not exist")));
        }

        let mut entry = WishlistEntry::new(user_id.clone(), course_id.clone());
        entry.revision = 1;

        store::execute(
            self.conn,
            "INSERT INTO wishlist_entries (
                id, user_id, course_id, created_at, server_updated_at, is_dirty, is_deleted, revision
            ) VALUES (?, ?, ?, ?, NULL, 1, 0, ?)",
            vec![
                store::id(&entry.id),
                store::id(&entry.user_id),
                store::id(&entry.course_id),
                store::timestamp(&entry.created_at),
                store::integer(entry.revision),
            ],
        )
        .await?;

        // Reload so created_at carries the stored precision
        self.find(&entry.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Wishlist entry {}", entry.id)))
    }

    async fn remove_wishlist_entry(
        &self,
        user_id: &EntityId,
        course_id: &EntityId,
    ) -> Result<Option<WishlistEntry>> {
        let Some(entry) = self.active_entry(user_id, course_id).await? else {
            return Ok(None);
        };

        store::execute(
            self.conn,
            "UPDATE wishlist_entries
             SET is_deleted = 1, is_dirty = 1, revision = revision + 1
             WHERE id = ?",
            vec![store::id(&entry.id)],
        )
        .await?;

        self.find(&entry.id).await
    }

    async fn list_wishlist(&self, user_id: &EntityId) -> Result<Vec<WishlistEntry>> {
        store::query_map(
            self.conn,
            &format!(
                "SELECT {WISHLIST_COLUMNS} FROM wishlist_entries
                 WHERE user_id = ? AND is_deleted = 0
                 ORDER BY created_at DESC, rowid DESC"
            ),
            vec![store::id(user_id)],
            parse_entry,
        )
        .await
    }

    async fn list_dirty_wishlist_entries(&self) -> Result<Vec<WishlistEntry>> {
        store::query_map(
            self.conn,
            &format!(
                "SELECT {WISHLIST_COLUMNS} FROM wishlist_entries WHERE is_dirty = 1 ORDER BY rowid"
            ),
            Vec::new(),
            parse_entry,
        )
        .await
    }

    async fn merge_remote_wishlist(&self, entries: &[WishlistEntry]) -> Result<MergeOutcome> {
        let courses = LibSqlCourseRepository::new(self.conn);
        let mut outcome = MergeOutcome::default();
        let mut statements = Vec::new();

        for incoming in entries {
            let incoming_version = incoming.version();
            if !courses.course_exists(&incoming.course_id).await? {
                outcome.skipped += 1;
                continue;
            }

            let local_rows = self
                .entries_for(&incoming.user_id, &incoming.course_id)
                .await?;

            if let Some(pending) = local_rows.iter().find(|row| row.is_dirty) {
                statements.push(conflict_statement(
                    SyncTable::WishlistEntries,
                    pending.id.as_str(),
                    pending.server_updated_at,
                    incoming_version,
                ));
                outcome.conflicts += 1;
                continue;
            }

            match local_rows.iter().find(|row| !row.is_deleted) {
                Some(local)
                    if local
                        .server_updated_at
                        .is_some_and(|version| version > incoming_version) =>
                {
                    statements.push(conflict_statement(
                        SyncTable::WishlistEntries,
                        local.id.as_str(),
                        local.server_updated_at,
                        incoming_version,
                    ));
                    outcome.conflicts += 1;
                }
                Some(local) => {
                    statements.push((
                        "UPDATE wishlist_entries SET created_at = ?, server_updated_at = ?
                         WHERE id = ?"
                            .to_string(),
                        vec![
                            store::timestamp(&incoming.created_at),
                            store::timestamp(&incoming_version),
                            store::id(&local.id),
                        ],
                    ));
                    outcome.applied += 1;
                }
                None => {
                    statements.push((
                        "INSERT INTO wishlist_entries (
                            id, user_id, course_id, created_at, server_updated_at,
                            is_dirty, is_deleted, revision
                        ) VALUES (?, ?, ?, ?, ?, 0, 0, 0)"
                            .to_string(),
                        vec![
                            store::id(&incoming.id),
                            store::id(&incoming.user_id),
                            store::id(&incoming.course_id),
                            store::timestamp(&incoming.created_at),
                            store::timestamp(&incoming_version),
                        ],
                    ));
                    outcome.applied += 1;
                }
            }
        }

        store::execute_batch(self.conn, statements).await?;
        Ok(outcome)
    }
}

fn parse_entry(row: &Row) -> RowResult<WishlistEntry> {
    Ok(WishlistEntry {
        id: store::read_id(row, 0)?,
        user_id: store::read_id(row, 1)?,
        course_id: store::read_id(row, 2)?,
        created_at: store::read_timestamp(row, 3)?,
        server_updated_at: store::read_opt_timestamp(row, 4)?,
        is_dirty: store::read_flag(row, 5)?,
        is_deleted: store::read_flag(row, 6)?,
        revision: row.get(7)?,
    })
}
