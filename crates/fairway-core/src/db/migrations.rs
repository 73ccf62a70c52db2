//! Database migrations

use crate::error::Result;
use libsql::Connection;

use super::store;

/// Current schema version
pub const CURRENT_VERSION: i64 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        apply(conn, 1, V1_STATEMENTS).await?;
    }
    if version < 2 {
        apply(conn, 2, V2_STATEMENTS).await?;
    }

    Ok(())
}

/// Get the current schema version
pub async fn get_version(conn: &Connection) -> Result<i64> {
    let exists = store::query_map(
        conn,
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        Vec::new(),
        |row| Ok(row.get::<i64>(0)? != 0),
    )
    .await?
    .into_iter()
    .next()
    .unwrap_or(false);

    if !exists {
        return Ok(0);
    }

    let version = store::query_optional(
        conn,
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        Vec::new(),
        |row| Ok(row.get::<i64>(0)?),
    )
    .await?;

    Ok(version.unwrap_or(0))
}

async fn apply(conn: &Connection, version: i64, statements: &[&str]) -> Result<()> {
    let mut batch: Vec<(String, Vec<libsql::Value>)> = statements
        .iter()
        .map(|statement| ((*statement).to_string(), Vec::new()))
        .collect();
    batch.push((
        "INSERT INTO schema_version (version) VALUES (?)".to_string(),
        vec![store::integer(version)],
    ));

    store::execute_batch(conn, batch).await?;

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Version 1: entity tables and sync state
const V1_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS courses (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        address1 TEXT NOT NULL,
        address2 TEXT,
        city TEXT NOT NULL,
        state_region TEXT,
        country TEXT NOT NULL,
        postal_code TEXT,
        latitude REAL,
        longitude REAL,
        phone TEXT,
        website TEXT,
        is_approved INTEGER NOT NULL DEFAULT 0,
        created_by_user_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        server_updated_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_courses_location ON courses(country, state_region, city)",
    "CREATE TABLE IF NOT EXISTS tee_boxes (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        par_total INTEGER,
        yardage_total INTEGER,
        slope REAL,
        rating REAL,
        server_updated_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_tee_boxes_course ON tee_boxes(course_id)",
    "CREATE TABLE IF NOT EXISTS visits (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        course_id TEXT NOT NULL REFERENCES courses(id),
        visit_date TEXT NOT NULL,
        holes_played INTEGER NOT NULL CHECK (holes_played IN (9, 18)),
        gross_score INTEGER,
        tee_box_id TEXT,
        tee_name TEXT,
        to_par INTEGER,
        server_updated_at TEXT,
        is_dirty INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        revision INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_visits_user_course_date ON visits(user_id, course_id, visit_date)",
    "CREATE INDEX IF NOT EXISTS idx_visits_user_date ON visits(user_id, visit_date)",
    "CREATE INDEX IF NOT EXISTS idx_visits_dirty ON visits(is_dirty)",
    "CREATE TABLE IF NOT EXISTS wishlist_entries (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        course_id TEXT NOT NULL REFERENCES courses(id),
        created_at TEXT NOT NULL,
        server_updated_at TEXT,
        is_dirty INTEGER NOT NULL DEFAULT 0,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        revision INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_wishlist_active
        ON wishlist_entries(user_id, course_id) WHERE is_deleted = 0",
    "CREATE TABLE IF NOT EXISTS course_suggestions (
        id TEXT PRIMARY KEY,
        submitted_by_user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        address1 TEXT NOT NULL,
        address2 TEXT,
        city TEXT NOT NULL,
        state_region TEXT,
        country TEXT NOT NULL,
        postal_code TEXT,
        phone TEXT,
        website TEXT,
        status TEXT NOT NULL DEFAULT 'Pending',
        decision_by TEXT,
        decision_at TEXT,
        created_at TEXT NOT NULL,
        server_updated_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_course_suggestions_status ON course_suggestions(status)",
    "CREATE TABLE IF NOT EXISTS sync_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

/// Version 2: last-write-wins conflict log
const V2_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sync_conflicts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name TEXT NOT NULL,
        row_id TEXT NOT NULL,
        local_version TEXT,
        incoming_version TEXT NOT NULL,
        resolved_at TEXT NOT NULL,
        strategy TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_row ON sync_conflicts(table_name, row_id)",
    "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC)",
];
