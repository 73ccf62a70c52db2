//! Course and tee box repository (server-owned rows)

use libsql::{Connection, Row, Value};

use super::store::{self, RowResult};
use super::sync_repository::conflict_statement;
use super::{MergeOutcome, SyncTable};
use crate::error::Result;
use crate::models::{Course, CourseDetail, CourseSearchParams, EntityId, TeeBox};
use crate::util::normalize_text_option;

/// Course columns, aliased to `c`, in [`parse_course`] order
pub(crate) const COURSE_COLUMNS: &str = "c.id, c.name, c.address1, c.address2, c.city, \
    c.state_region, c.country, c.postal_code, c.latitude, c.longitude, c.phone, c.website, \
    c.is_approved, c.created_by_user_id, c.created_at, c.updated_at, c.server_updated_at";

/// Number of columns in [`COURSE_COLUMNS`]
pub(crate) const COURSE_COLUMN_COUNT: i32 = 17;

const TEE_BOX_COLUMNS: &str =
    "id, course_id, name, par_total, yardage_total, slope, rating, server_updated_at";

/// Trait for catalog storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CourseRepository {
    /// Insert or update courses together with their tee boxes.
    ///
    /// Tee boxes missing from a payload are removed. A course whose stored
    /// version is newer than the incoming one is left alone and logged as a
    /// conflict.
    async fn upsert_courses(&self, rows: &[CourseDetail]) -> Result<MergeOutcome>;

    /// Insert or update course rows only, leaving tee boxes untouched
    async fn upsert_course_summaries(&self, rows: &[Course]) -> Result<MergeOutcome>;

    async fn get_course(&self, id: &EntityId) -> Result<Option<Course>>;

    async fn get_course_detail(&self, id: &EntityId) -> Result<Option<CourseDetail>>;

    /// Filter the local catalog by text, country and region
    async fn search_courses(&self, params: &CourseSearchParams) -> Result<Vec<Course>>;

    async fn course_exists(&self, id: &EntityId) -> Result<bool>;

    /// Par of a tee box, when the tee box is known and has one
    async fn tee_box_par(&self, tee_box_id: &EntityId) -> Result<Option<i32>>;

    async fn get_tee_box(&self, tee_box_id: &EntityId) -> Result<Option<TeeBox>>;
}

/// libSQL implementation of `CourseRepository`
pub struct LibSqlCourseRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCourseRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Stored `server_updated_at`, `None` when the course is unknown
    async fn stored_version(
        &self,
        id: &EntityId,
    ) -> Result<Option<Option<chrono::DateTime<chrono::Utc>>>> {
        store::query_optional(
            self.conn,
            "SELECT server_updated_at FROM courses WHERE id = ?",
            vec![store::id(id)],
            |row| store::read_opt_timestamp(row, 0),
        )
        .await
    }

    /// Build the statements for `courses`, skipping stale ones.
    async fn plan_course_upserts<'c>(
        &self,
        courses: impl Iterator<Item = &'c Course>,
        statements: &mut Vec<(String, Vec<Value>)>,
    ) -> Result<(MergeOutcome, Vec<EntityId>)> {
        let mut outcome = MergeOutcome::default();
        let mut accepted = Vec::new();

        for course in courses {
            let incoming = course.version();
            let stored = self.stored_version(&course.id).await?.flatten();

            if stored.is_some_and(|stored| stored > incoming) {
                tracing::debug!(course_id = %course.id, "Skipping stale course payload");
                statements.push(conflict_statement(
                    SyncTable::Courses,
                    course.id.as_str(),
                    stored,
                    incoming,
                ));
                outcome.conflicts += 1;
                continue;
            }

            statements.push(course_upsert(course));
            accepted.push(course.id.clone());
            outcome.applied += 1;
        }

        Ok((outcome, accepted))
    }

    async fn list_tee_boxes(&self, course_id: &EntityId) -> Result<Vec<TeeBox>> {
        store::query_map(
            self.conn,
            &format!(
                "SELECT {TEE_BOX_COLUMNS} FROM tee_boxes WHERE course_id = ? ORDER BY name COLLATE NOCASE, id"
            ),
            vec![store::id(course_id)],
            parse_tee_box,
        )
        .await
    }
}

impl CourseRepository for LibSqlCourseRepository<'_> {
    async fn upsert_courses(&self, rows: &[CourseDetail]) -> Result<MergeOutcome> {
        let mut statements = Vec::new();
        let (outcome, accepted) = self
            .plan_course_upserts(rows.iter().map(|detail| &detail.course), &mut statements)
            .await?;

        for detail in rows
            .iter()
            .filter(|detail| accepted.contains(&detail.course.id))
        {
            let course_id = &detail.course.id;
            statements.push(tee_box_prune(course_id, &detail.tee_boxes));
            for tee_box in &detail.tee_boxes {
                statements.push(tee_box_upsert(course_id, tee_box));
            }
        }

        store::execute_batch(self.conn, statements).await?;
        tracing::debug!(
            applied = outcome.applied,
            conflicts = outcome.conflicts,
            "Upserted course details"
        );
        Ok(outcome)
    }

    async fn upsert_course_summaries(&self, rows: &[Course]) -> Result<MergeOutcome> {
        let mut statements = Vec::new();
        let (outcome, _) = self.plan_course_upserts(rows.iter(), &mut statements).await?;
        store::execute_batch(self.conn, statements).await?;
        Ok(outcome)
    }

    async fn get_course(&self, id: &EntityId) -> Result<Option<Course>> {
        store::query_optional(
            self.conn,
            &format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE c.id = ?"),
            vec![store::id(id)],
            parse_course,
        )
        .await
    }

    async fn get_course_detail(&self, id: &EntityId) -> Result<Option<CourseDetail>> {
        let Some(course) = self.get_course(id).await? else {
            return Ok(None);
        };
        let tee_boxes = self.list_tee_boxes(id).await?;
        Ok(Some(CourseDetail { course, tee_boxes }))
    }

    async fn search_courses(&self, params: &CourseSearchParams) -> Result<Vec<Course>> {
        let mut sql = format!("SELECT {COURSE_COLUMNS} FROM courses c WHERE 1 = 1");
        let mut values = Vec::new();

        if let Some(search) = normalize_text_option(params.search.clone()) {
            sql.push_str(
                " AND (instr(lower(c.name), lower(?)) > 0 OR instr(lower(c.city), lower(?)) > 0)",
            );
            values.push(store::text(search.clone()));
            values.push(store::text(search));
        }
        if let Some(country) = normalize_text_option(params.country.clone()) {
            sql.push_str(" AND c.country = ? COLLATE NOCASE");
            values.push(store::text(country));
        }
        if let Some(region) = normalize_text_option(params.region.clone()) {
            sql.push_str(" AND c.state_region = ? COLLATE NOCASE");
            values.push(store::text(region));
        }

        sql.push_str(" ORDER BY c.name COLLATE NOCASE, c.id LIMIT ? OFFSET ?");
        values.push(store::integer(params.take.map_or(-1, i64::from)));
        values.push(store::integer(params.skip.map_or(0, i64::from)));

        store::query_map(self.conn, &sql, values, parse_course).await
    }

    async fn course_exists(&self, id: &EntityId) -> Result<bool> {
        Ok(self.stored_version(id).await?.is_some())
    }

    async fn tee_box_par(&self, tee_box_id: &EntityId) -> Result<Option<i32>> {
        Ok(self
            .get_tee_box(tee_box_id)
            .await?
            .and_then(|tee_box| tee_box.par_total))
    }

    async fn get_tee_box(&self, tee_box_id: &EntityId) -> Result<Option<TeeBox>> {
        store::query_optional(
            self.conn,
            &format!("SELECT {TEE_BOX_COLUMNS} FROM tee_boxes WHERE id = ?"),
            vec![store::id(tee_box_id)],
            parse_tee_box,
        )
        .await
    }
}

fn course_upsert(course: &Course) -> (String, Vec<Value>) {
    (
        "INSERT INTO courses (
            id, name, address1, address2, city, state_region, country, postal_code,
            latitude, longitude, phone, website, is_approved, created_by_user_id,
            created_at, updated_at, server_updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            address1 = excluded.address1,
            address2 = excluded.address2,
            city = excluded.city,
            state_region = excluded.state_region,
            country = excluded.country,
            postal_code = excluded.postal_code,
            latitude = excluded.latitude,
            longitude = excluded.longitude,
            phone = excluded.phone,
            website = excluded.website,
            is_approved = excluded.is_approved,
            created_by_user_id = excluded.created_by_user_id,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            server_updated_at = excluded.server_updated_at"
            .to_string(),
        vec![
            store::id(&course.id),
            store::text(course.name.clone()),
            store::text(course.address1.clone()),
            store::opt_text(course.address2.as_deref()),
            store::text(course.city.clone()),
            store::opt_text(course.state_region.as_deref()),
            store::text(course.country.clone()),
            store::opt_text(course.postal_code.as_deref()),
            store::opt_real(course.latitude),
            store::opt_real(course.longitude),
            store::opt_text(course.phone.as_deref()),
            store::opt_text(course.website.as_deref()),
            store::flag(course.is_approved),
            store::opt_id(course.created_by_user_id.as_ref()),
            store::timestamp(&course.created_at),
            store::timestamp(&course.updated_at),
            store::timestamp(&course.version()),
        ],
    )
}

fn tee_box_prune(course_id: &EntityId, keep: &[TeeBox]) -> (String, Vec<Value>) {
    let mut params = vec![store::id(course_id)];
    if keep.is_empty() {
        return ("DELETE FROM tee_boxes WHERE course_id = ?".to_string(), params);
    }

    let placeholders = vec!["?"; keep.len()].join(", ");
    params.extend(keep.iter().map(|tee_box| store::id(&tee_box.id)));
    (
        format!("DELETE FROM tee_boxes WHERE course_id = ? AND id NOT IN ({placeholders})"),
        params,
    )
}

fn tee_box_upsert(course_id: &EntityId, tee_box: &TeeBox) -> (String, Vec<Value>) {
    (
        "INSERT INTO tee_boxes (
            id, course_id, name, par_total, yardage_total, slope, rating, server_updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            course_id = excluded.course_id,
            name = excluded.name,
            par_total = excluded.par_total,
            yardage_total = excluded.yardage_total,
            slope = excluded.slope,
            rating = excluded.rating,
            server_updated_at = excluded.server_updated_at"
            .to_string(),
        vec![
            store::id(&tee_box.id),
            store::id(course_id),
            store::text(tee_box.name.clone()),
            store::opt_integer(tee_box.par_total),
            store::opt_integer(tee_box.yardage_total),
            store::opt_real(tee_box.slope),
            store::opt_real(tee_box.rating),
            store::opt_timestamp(tee_box.server_updated_at.as_ref()),
        ],
    )
}

/// Parse a course from [`COURSE_COLUMNS`] starting at column 0
pub(crate) fn parse_course(row: &Row) -> RowResult<Course> {
    Ok(Course {
        id: store::read_id(row, 0)?,
        name: row.get(1)?,
        address1: row.get(2)?,
        address2: row.get(3)?,
        city: row.get(4)?,
        state_region: row.get(5)?,
        country: row.get(6)?,
        postal_code: row.get(7)?,
        latitude: row.get(8)?,
        longitude: row.get(9)?,
        phone: row.get(10)?,
        website: row.get(11)?,
        is_approved: store::read_flag(row, 12)?,
        created_by_user_id: store::read_opt_id(row, 13)?,
        created_at: store::read_timestamp(row, 14)?,
        updated_at: store::read_timestamp(row, 15)?,
        server_updated_at: store::read_opt_timestamp(row, 16)?,
    })
}

fn parse_tee_box(row: &Row) -> RowResult<TeeBox> {
    Ok(TeeBox {
        id: store::read_id(row, 0)?,
        course_id: store::read_id(row, 1)?,
        name: row.get(2)?,
        par_total: store::read_opt_i32(row, 3)?,
        yardage_total: store::read_opt_i32(row, 4)?,
        slope: row.get(5)?,
        rating: row.get(6)?,
        server_updated_at: store::read_opt_timestamp(row, 7)?,
    })
}
