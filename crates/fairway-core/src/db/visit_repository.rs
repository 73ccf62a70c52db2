//! Visit repository implementation

use libsql::{Connection, Row, Value};

use super::course_repository::{
    parse_course, CourseRepository, LibSqlCourseRepository, COURSE_COLUMNS, COURSE_COLUMN_COUNT,
};
use super::store::{self, RowResult};
use super::sync_repository::conflict_statement;
use super::{MergeOutcome, SyncTable};
use crate::error::{Error, Result};
use crate::models::{EntityId, HolesPlayed, Visit, VisitDraft, VisitFilter, VisitPatch, VisitedCourse};

const VISIT_COLUMNS: &str = "v.id, v.user_id, v.course_id, v.visit_date, v.holes_played, \
    v.gross_score, v.tee_box_id, v.tee_name, v.to_par, v.server_updated_at, v.is_dirty, \
    v.is_deleted, v.revision";

/// Trait for visit storage operations (async)
#[allow(async_fn_in_trait)]
pub trait VisitRepository {
    /// Record a new visit locally, pending push
    async fn create_visit(&self, user_id: &EntityId, draft: VisitDraft) -> Result<Visit>;

    /// Apply a patch to a live visit and mark it dirty
    async fn update_visit(&self, id: &EntityId, patch: VisitPatch) -> Result<Visit>;

    /// Soft delete a visit; the row stays until the server acknowledges it
    async fn soft_delete_visit(&self, id: &EntityId) -> Result<Visit>;

    /// Get a live (not soft-deleted) visit by ID
    async fn get_visit(&self, id: &EntityId) -> Result<Option<Visit>>;

    /// List live visits, most recent first
    async fn list_visits(&self, user_id: &EntityId, filter: &VisitFilter) -> Result<Vec<Visit>>;

    /// Courses with at least one live visit, with counts
    async fn list_visited_courses(&self, user_id: &EntityId) -> Result<Vec<VisitedCourse>>;

    /// Visits waiting to be pushed, in insertion order
    async fn list_dirty_visits(&self) -> Result<Vec<Visit>>;

    /// Apply visits pulled from the server under last-write-wins
    async fn merge_remote_visits(&self, visits: &[Visit]) -> Result<MergeOutcome>;
}

/// libSQL implementation of `VisitRepository`
pub struct LibSqlVisitRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlVisitRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    const fn courses(&self) -> LibSqlCourseRepository<'a> {
        LibSqlCourseRepository::new(self.conn)
    }

    /// Look up a visit, soft-deleted rows included
    async fn find(&self, id: &EntityId) -> Result<Option<Visit>> {
        store::query_optional(
            self.conn,
            &format!("SELECT {VISIT_COLUMNS} FROM visits v WHERE v.id = ?"),
            vec![store::id(id)],
            parse_visit,
        )
        .await
    }

    /// Check the tee box belongs to the course and return its par
    async fn resolve_tee_box(&self, visit: &mut Visit) -> Result<Option<i32>> {
        let Some(tee_box_id) = visit.tee_box_id.as_ref() else {
            return Ok(None);
        };
        let Some(tee_box) = self.courses().get_tee_box(tee_box_id).await? else {
            return Ok(None);
        };

        if tee_box.course_id != visit.course_id {
            return Err(Error::Validation(format!(
                "Tee box {} does not belong to course {}",
                tee_box.id, visit.course_id
            )));
        }
        if visit.tee_name.is_none() {
            visit.tee_name = Some(tee_box.name);
        }
        Ok(tee_box.par_total)
    }
}

fn validate_score(gross_score: Option<i32>) -> Result<()> {
    match gross_score {
        Some(score) if score <= 0 => Err(Error::Validation(format!(
            "Gross score must be positive, got {score}"
        ))),
        _ => Ok(()),
    }
}

impl VisitRepository for LibSqlVisitRepository<'_> {
    async fn create_visit(&self, user_id: &EntityId, draft: VisitDraft) -> Result<Visit> {
        if !self.courses().course_exists(&draft.course_id).await? {
            return Err(Error::Validation(format!(
                "Course {} does not exist",
                draft.course_id
            )));
        }
        validate_score(draft.gross_score)?;
        if self.find(&draft.id).await?.is_some() {
            return Err(Error::Validation(format!("Visit {} already exists", draft.id)));
        }

        let mut visit = Visit::from_draft(user_id.clone(), draft);
        let par = self.resolve_tee_box(&mut visit).await?;
        visit.to_par = visit.compute_to_par(par);
        visit.revision = 1;

        store::execute(
            self.conn,
            "INSERT INTO visits (
                id, user_id, course_id, visit_date, holes_played, gross_score, tee_box_id,
                tee_name, to_par, server_updated_at, is_dirty, is_deleted, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 1, 0, ?)",
            vec![
                store::id(&visit.id),
                store::id(&visit.user_id),
                store::id(&visit.course_id),
                store::date(visit.visit_date),
                store::integer(visit.holes_played.count()),
                store::opt_integer(visit.gross_score),
                store::opt_id(visit.tee_box_id.as_ref()),
                store::opt_text(visit.tee_name.as_deref()),
                store::opt_integer(visit.to_par),
                store::integer(visit.revision),
            ],
        )
        .await?;

        tracing::debug!(visit_id = %visit.id, course_id = %visit.course_id, "Recorded visit");
        Ok(visit)
    }

    async fn update_visit(&self, id: &EntityId, patch: VisitPatch) -> Result<Visit> {
        let mut visit = self
            .get_visit(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Visit {id}")))?;
        if patch.is_empty() {
            return Ok(visit);
        }
        validate_score(patch.gross_score)?;

        let affects_par =
            patch.holes_played.is_some() || patch.gross_score.is_some() || patch.tee_box_id.is_some();
        if patch.tee_box_id.is_some() && patch.tee_name.is_none() {
            visit.tee_name = None;
        }
        patch.apply(&mut visit);

        let par = self.resolve_tee_box(&mut visit).await?;
        match visit.compute_to_par(par) {
            Some(to_par) => visit.to_par = Some(to_par),
            None if affects_par => visit.to_par = None,
            None => {}
        }

        store::execute(
            self.conn,
            "UPDATE visits SET
                visit_date = ?, holes_played = ?, gross_score = ?, tee_box_id = ?,
                tee_name = ?, to_par = ?, is_dirty = 1, revision = revision + 1
             WHERE id = ?",
            vec![
                store::date(visit.visit_date),
                store::integer(visit.holes_played.count()),
                store::opt_integer(visit.gross_score),
                store::opt_id(visit.tee_box_id.as_ref()),
                store::opt_text(visit.tee_name.as_deref()),
                store::opt_integer(visit.to_par),
                store::id(id),
            ],
        )
        .await?;

        self.find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Visit {id}")))
    }

    async fn soft_delete_visit(&self, id: &EntityId) -> Result<Visit> {
        let visit = self
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Visit {id}")))?;
        if visit.is_deleted {
            return Ok(visit);
        }

        store::execute(
            self.conn,
            "UPDATE visits SET is_deleted = 1, is_dirty = 1, revision = revision + 1 WHERE id = ?",
            vec![store::id(id)],
        )
        .await?;

        self.find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Visit {id}")))
    }

    async fn get_visit(&self, id: &EntityId) -> Result<Option<Visit>> {
        Ok(self.find(id).await?.filter(|visit| !visit.is_deleted))
    }

    async fn list_visits(&self, user_id: &EntityId, filter: &VisitFilter) -> Result<Vec<Visit>> {
        let mut sql = format!(
            "SELECT {VISIT_COLUMNS} FROM visits v
             JOIN courses c ON c.id = v.course_id
             WHERE v.user_id = ? AND v.is_deleted = 0"
        );
        let mut values: Vec<Value> = vec![store::id(user_id)];

        if let Some(course_id) = &filter.course_id {
            sql.push_str(" AND v.course_id = ?");
            values.push(store::id(course_id));
        }
        if let Some(year) = filter.year {
            sql.push_str(" AND substr(v.visit_date, 1, 4) = ?");
            values.push(store::text(format!("{year:04}")));
        }
        if let Some(country) = &filter.country {
            sql.push_str(" AND c.country = ? COLLATE NOCASE");
            values.push(store::text(country.trim()));
        }

        sql.push_str(" ORDER BY v.visit_date DESC, v.rowid DESC LIMIT ? OFFSET ?");
        values.push(store::integer(filter.limit.map_or(-1, i64::from)));
        values.push(store::integer(filter.offset.map_or(0, i64::from)));

        store::query_map(self.conn, &sql, values, parse_visit).await
    }

    async fn list_visited_courses(&self, user_id: &EntityId) -> Result<Vec<VisitedCourse>> {
        store::query_map(
            self.conn,
            &format!(
                "SELECT {COURSE_COLUMNS}, COUNT(v.id), MAX(v.visit_date)
                 FROM visits v
                 JOIN courses c ON c.id = v.course_id
                 WHERE v.user_id = ? AND v.is_deleted = 0
                 GROUP BY c.id
                 ORDER BY MAX(v.visit_date) DESC, c.name COLLATE NOCASE"
            ),
            vec![store::id(user_id)],
            |row| {
                Ok(VisitedCourse {
                    course: parse_course(row)?,
                    visit_count: row.get(COURSE_COLUMN_COUNT)?,
                    last_visit_date: store::read_date(row, COURSE_COLUMN_COUNT + 1)?,
                })
            },
        )
        .await
    }

    async fn list_dirty_visits(&self) -> Result<Vec<Visit>> {
        store::query_map(
            self.conn,
            &format!("SELECT {VISIT_COLUMNS} FROM visits v WHERE v.is_dirty = 1 ORDER BY v.rowid"),
            Vec::new(),
            parse_visit,
        )
        .await
    }

    async fn merge_remote_visits(&self, visits: &[Visit]) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();
        let mut statements = Vec::new();

        for incoming in visits {
            let Some(incoming_version) = incoming.server_updated_at else {
                tracing::warn!(visit_id = %incoming.id, "Pulled visit has no server version");
                outcome.skipped += 1;
                continue;
            };
            if !self.courses().course_exists(&incoming.course_id).await? {
                tracing::debug!(
                    visit_id = %incoming.id,
                    course_id = %incoming.course_id,
                    "Skipping pulled visit for unknown course"
                );
                outcome.skipped += 1;
                continue;
            }

            if let Some(local) = self.find(&incoming.id).await? {
                let newer_locally = local
                    .server_updated_at
                    .is_some_and(|local_version| local_version > incoming_version);
                if local.is_dirty || newer_locally {
                    statements.push(conflict_statement(
                        SyncTable::Visits,
                        incoming.id.as_str(),
                        local.server_updated_at,
                        incoming_version,
                    ));
                    outcome.conflicts += 1;
                    continue;
                }
            }

            let mut merged = incoming.clone();
            if merged.to_par.is_none() {
                let par = match &merged.tee_box_id {
                    Some(tee_box_id) => self.courses().tee_box_par(tee_box_id).await?,
                    None => None,
                };
                merged.to_par = merged.compute_to_par(par);
            }
            statements.push(remote_visit_upsert(&merged, incoming_version));
            outcome.applied += 1;
        }

        store::execute_batch(self.conn, statements).await?;
        Ok(outcome)
    }
}

fn remote_visit_upsert(visit: &Visit, version: chrono::DateTime<chrono::Utc>) -> (String, Vec<Value>) {
    (
        "INSERT INTO visits (
            id, user_id, course_id, visit_date, holes_played, gross_score, tee_box_id,
            tee_name, to_par, server_updated_at, is_dirty, is_deleted, revision
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            course_id = excluded.course_id,
            visit_date = excluded.visit_date,
            holes_played = excluded.holes_played,
            gross_score = excluded.gross_score,
            tee_box_id = excluded.tee_box_id,
            tee_name = excluded.tee_name,
            to_par = excluded.to_par,
            server_updated_at = excluded.server_updated_at,
            is_dirty = 0"
            .to_string(),
        vec![
            store::id(&visit.id),
            store::id(&visit.user_id),
            store::id(&visit.course_id),
            store::date(visit.visit_date),
            store::integer(visit.holes_played.count()),
            store::opt_integer(visit.gross_score),
            store::opt_id(visit.tee_box_id.as_ref()),
            store::opt_text(visit.tee_name.as_deref()),
            store::opt_integer(visit.to_par),
            store::timestamp(&version),
        ],
    )
}

fn parse_visit(row: &Row) -> RowResult<Visit> {
    let holes = row.get::<i64>(4)?;
    Ok(Visit {
        id: store::read_id(row, 0)?,
        user_id: store::read_id(row, 1)?,
        course_id: store::read_id(row, 2)?,
        visit_date: store::read_date(row, 3)?,
        holes_played: HolesPlayed::try_from(holes).map_err(store::RowError)?,
        gross_score: store::read_opt_i32(row, 5)?,
        tee_box_id: store::read_opt_id(row, 6)?,
        tee_name: row.get(7)?,
        to_par: store::read_opt_i32(row, 8)?,
        server_updated_at: store::read_opt_timestamp(row, 9)?,
        is_dirty: store::read_flag(row, 10)?,
        is_deleted: store::read_flag(row, 11)?,
        revision: row.get(12)?,
    })
}
