//! Course suggestion repository implementation

use libsql::{Connection, Row, Value};

use super::store::{self, RowResult};
use super::sync_repository::conflict_statement;
use super::{MergeOutcome, SyncTable};
use crate::error::{Error, Result};
use crate::models::{CourseSuggestion, EntityId, SuggestionDraft, SuggestionStatus};
use crate::util::normalize_text_option;

const SUGGESTION_COLUMNS: &str = "id, submitted_by_user_id, name, address1, address2, city, \
    state_region, country, postal_code, phone, website, status, decision_by, decision_at, \
    created_at, server_updated_at";

/// Trait for course suggestion storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SuggestionRepository {
    /// Store a suggestion locally, awaiting submission
    async fn create_suggestion(
        &self,
        user_id: &EntityId,
        draft: SuggestionDraft,
    ) -> Result<CourseSuggestion>;

    /// Suggestions the server has not confirmed yet, in insertion order
    async fn list_pending_submissions(&self) -> Result<Vec<CourseSuggestion>>;

    /// Replace a submitted suggestion with the server's copy
    async fn confirm_submission(
        &self,
        local_id: &EntityId,
        confirmed: &CourseSuggestion,
    ) -> Result<()>;

    /// Insert or update suggestions pulled from the server
    async fn upsert_suggestions(&self, rows: &[CourseSuggestion]) -> Result<MergeOutcome>;

    /// Suggestions newest first, optionally narrowed by submitter and status
    async fn list_suggestions(
        &self,
        submitted_by: Option<&EntityId>,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<CourseSuggestion>>;
}

/// libSQL implementation of `SuggestionRepository`
pub struct LibSqlSuggestionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSuggestionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn find(&self, id: &EntityId) -> Result<Option<CourseSuggestion>> {
        store::query_optional(
            self.conn,
            &format!("SELECT {SUGGESTION_COLUMNS} FROM course_suggestions WHERE id = ?"),
            vec![store::id(id)],
            parse_suggestion,
        )
        .await
    }
}

fn required(field: &str, value: String) -> Result<String> {
    normalize_text_option(Some(value))
        .ok_or_else(|| Error::Validation(format!("Suggestion {field} is required")))
}

impl SuggestionRepository for LibSqlSuggestionRepository<'_> {
    async fn create_suggestion(
        &self,
        user_id: &EntityId,
        draft: SuggestionDraft,
    ) -> Result<CourseSuggestion> {
        let draft = SuggestionDraft {
            name: required("name", draft.name)?,
            address1: required("address", draft.address1)?,
            city: required("city", draft.city)?,
            country: required("country", draft.country)?,
            address2: normalize_text_option(draft.address2),
            state_region: normalize_text_option(draft.state_region),
            postal_code: normalize_text_option(draft.postal_code),
            phone: normalize_text_option(draft.phone),
            website: normalize_text_option(draft.website),
            id: draft.id,
        };

        let suggestion = CourseSuggestion::from_draft(user_id.clone(), draft);
        let (sql, params) = suggestion_insert(&suggestion, false);
        store::execute(self.conn, &sql, params).await?;

        tracing::debug!(suggestion_id = %suggestion.id, "Stored course suggestion");
        self.find(&suggestion.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Suggestion {}", suggestion.id)))
    }

    async fn list_pending_submissions(&self) -> Result<Vec<CourseSuggestion>> {
        store::query_map(
            self.conn,
            &format!(
                "SELECT {SUGGESTION_COLUMNS} FROM course_suggestions
                 WHERE server_updated_at IS NULL
                 ORDER BY rowid"
            ),
            Vec::new(),
            parse_suggestion,
        )
        .await
    }

    async fn confirm_submission(
        &self,
        local_id: &EntityId,
        confirmed: &CourseSuggestion,
    ) -> Result<()> {
        let mut statements = Vec::new();
        if local_id != &confirmed.id {
            statements.push((
                "DELETE FROM course_suggestions WHERE id = ?".to_string(),
                vec![store::id(local_id)],
            ));
        }
        statements.push(suggestion_insert(confirmed, true));
        store::execute_batch(self.conn, statements).await
    }

    async fn upsert_suggestions(&self, rows: &[CourseSuggestion]) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();
        let mut statements = Vec::new();

        for incoming in rows {
            let incoming_version = incoming.version();
            let local_version = self
                .find(&incoming.id)
                .await?
                .and_then(|local| local.server_updated_at);

            if local_version.is_some_and(|local| local > incoming_version) {
                statements.push(conflict_statement(
                    SyncTable::CourseSuggestions,
                    incoming.id.as_str(),
                    local_version,
                    incoming_version,
                ));
                outcome.conflicts += 1;
                continue;
            }

            statements.push(suggestion_insert(incoming, true));
            outcome.applied += 1;
        }

        store::execute_batch(self.conn, statements).await?;
        Ok(outcome)
    }

    async fn list_suggestions(
        &self,
        submitted_by: Option<&EntityId>,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<CourseSuggestion>> {
        let mut sql = format!("SELECT {SUGGESTION_COLUMNS} FROM course_suggestions WHERE 1 = 1");
        let mut values = Vec::new();

        if let Some(user_id) = submitted_by {
            sql.push_str(" AND submitted_by_user_id = ?");
            values.push(store::id(user_id));
        }
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            values.push(store::text(status.as_str()));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");

        store::query_map(self.conn, &sql, values, parse_suggestion).await
    }
}

/// Insert (or, with `server_copy`, upsert) a suggestion row
fn suggestion_insert(suggestion: &CourseSuggestion, server_copy: bool) -> (String, Vec<Value>) {
    let mut sql = "INSERT INTO course_suggestions (
            id, submitted_by_user_id, name, address1, address2, city, state_region, country,
            postal_code, phone, website, status, decision_by, decision_at, created_at,
            server_updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        .to_string();
    if server_copy {
        sql.push_str(
            " ON CONFLICT(id) DO UPDATE SET
                submitted_by_user_id = excluded.submitted_by_user_id,
                name = excluded.name,
                address1 = excluded.address1,
                address2 = excluded.address2,
                city = excluded.city,
                state_region = excluded.state_region,
                country = excluded.country,
                postal_code = excluded.postal_code,
                phone = excluded.phone,
                website = excluded.website,
                status = excluded.status,
                decision_by = excluded.decision_by,
                decision_at = excluded.decision_at,
                created_at = excluded.created_at,
                server_updated_at = excluded.server_updated_at",
        );
    }

    let server_version = server_copy.then(|| suggestion.version());
    let params = vec![
        store::id(&suggestion.id),
        store::id(&suggestion.submitted_by_user_id),
        store::text(suggestion.name.clone()),
        store::text(suggestion.address1.clone()),
        store::opt_text(suggestion.address2.as_deref()),
        store::text(suggestion.city.clone()),
        store::opt_text(suggestion.state_region.as_deref()),
        store::text(suggestion.country.clone()),
        store::opt_text(suggestion.postal_code.as_deref()),
        store::opt_text(suggestion.phone.as_deref()),
        store::opt_text(suggestion.website.as_deref()),
        store::text(suggestion.status.as_str()),
        store::opt_text(suggestion.decision_by.as_deref()),
        store::opt_timestamp(suggestion.decision_at.as_ref()),
        store::timestamp(&suggestion.created_at),
        store::opt_timestamp(server_version.as_ref()),
    ];
    (sql, params)
}

fn parse_suggestion(row: &Row) -> RowResult<CourseSuggestion> {
    let status = row.get::<String>(11)?;
    Ok(CourseSuggestion {
        id: store::read_id(row, 0)?,
        submitted_by_user_id: store::read_id(row, 1)?,
        name: row.get(2)?,
        address1: row.get(3)?,
        address2: row.get(4)?,
        city: row.get(5)?,
        state_region: row.get(6)?,
        country: row.get(7)?,
        postal_code: row.get(8)?,
        phone: row.get(9)?,
        website: row.get(10)?,
        status: status.parse().map_err(store::RowError)?,
        decision_by: row.get(12)?,
        decision_at: store::read_opt_timestamp(row, 13)?,
        created_at: store::read_timestamp(row, 14)?,
        server_updated_at: store::read_opt_timestamp(row, 15)?,
    })
}
