//! Statement primitives shared by every repository
//!
//! All reads and writes go through [`execute`] and [`query_map`] so a failing
//! statement always surfaces as a [`StorageError`] carrying the SQL text and
//! its parameters.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::params::Params;
use libsql::{Connection, Row, Value};

use crate::error::{Result, StorageError};
use crate::models::EntityId;

/// Outcome of a mutating statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

/// Row decoding failure, turned into a [`StorageError`] by the caller
#[derive(Debug)]
pub struct RowError(pub String);

impl From<libsql::Error> for RowError {
    fn from(error: libsql::Error) -> Self {
        Self(error.to_string())
    }
}

pub type RowResult<T> = std::result::Result<T, RowError>;

/// Run a mutating statement.
pub async fn execute(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<ExecuteResult> {
    match conn.execute(sql, Params::Positional(params.clone())).await {
        Ok(rows_affected) => Ok(ExecuteResult {
            rows_affected,
            last_insert_id: conn.last_insert_rowid(),
        }),
        Err(error) => Err(StorageError::new(sql, &params, error).into()),
    }
}

/// Run a query and decode every row with `map`.
pub async fn query_map<T, F>(
    conn: &Connection,
    sql: &str,
    params: Vec<Value>,
    map: F,
) -> Result<Vec<T>>
where
    F: Fn(&Row) -> RowResult<T>,
{
    let fail = |message: String| StorageError::new(sql, &params, message);

    let mut rows = conn
        .query(sql, Params::Positional(params.clone()))
        .await
        .map_err(|error| fail(error.to_string()))?;

    let mut items = Vec::new();
    while let Some(row) = rows.next().await.map_err(|error| fail(error.to_string()))? {
        items.push(map(&row).map_err(|error| fail(error.0))?);
    }
    Ok(items)
}

/// Run a query expected to return at most one row.
pub async fn query_optional<T, F>(
    conn: &Connection,
    sql: &str,
    params: Vec<Value>,
    map: F,
) -> Result<Option<T>>
where
    F: Fn(&Row) -> RowResult<T>,
{
    Ok(query_map(conn, sql, params, map).await?.into_iter().next())
}

/// Run statements atomically, rolling back on the first failure.
pub async fn execute_batch(conn: &Connection, statements: Vec<(String, Vec<Value>)>) -> Result<()> {
    execute(conn, "BEGIN TRANSACTION", Vec::new()).await?;

    for (sql, params) in statements {
        if let Err(error) = execute(conn, &sql, params).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error);
        }
    }

    if let Err(error) = execute(conn, "COMMIT", Vec::new()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(error);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

pub fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |value| Value::Text(value.to_string()))
}

pub fn id(value: &EntityId) -> Value {
    Value::Text(value.as_str().to_string())
}

pub fn opt_id(value: Option<&EntityId>) -> Value {
    value.map_or(Value::Null, id)
}

pub fn integer(value: impl Into<i64>) -> Value {
    Value::Integer(value.into())
}

pub fn opt_integer(value: Option<i32>) -> Value {
    value.map_or(Value::Null, |value| Value::Integer(i64::from(value)))
}

pub fn opt_real(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Real)
}

pub fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

pub fn timestamp(value: &DateTime<Utc>) -> Value {
    Value::Text(format_timestamp(value))
}

pub fn opt_timestamp(value: Option<&DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, timestamp)
}

pub fn date(value: NaiveDate) -> Value {
    Value::Text(value.format("%Y-%m-%d").to_string())
}

/// Fixed-width RFC 3339 so stored values also sort lexically.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse RFC 3339, accepting bare dates as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Column readers
// ---------------------------------------------------------------------------

pub fn read_id(row: &Row, idx: i32) -> RowResult<EntityId> {
    Ok(EntityId::from(row.get::<String>(idx)?))
}

pub fn read_opt_id(row: &Row, idx: i32) -> RowResult<Option<EntityId>> {
    Ok(row.get::<Option<String>>(idx)?.map(EntityId::from))
}

pub fn read_flag(row: &Row, idx: i32) -> RowResult<bool> {
    Ok(row.get::<i64>(idx)? != 0)
}

pub fn read_opt_i32(row: &Row, idx: i32) -> RowResult<Option<i32>> {
    row.get::<Option<i64>>(idx)?
        .map(|value| {
            i32::try_from(value)
                .map_err(|_| RowError(format!("column {idx}: {value} out of range")))
        })
        .transpose()
}

pub fn read_timestamp(row: &Row, idx: i32) -> RowResult<DateTime<Utc>> {
    let raw = row.get::<String>(idx)?;
    parse_timestamp(&raw).ok_or_else(|| RowError(format!("column {idx}: invalid timestamp '{raw}'")))
}

pub fn read_opt_timestamp(row: &Row, idx: i32) -> RowResult<Option<DateTime<Utc>>> {
    row.get::<Option<String>>(idx)?
        .map(|raw| {
            parse_timestamp(&raw)
                .ok_or_else(|| RowError(format!("column {idx}: invalid timestamp '{raw}'")))
        })
        .transpose()
}

pub fn read_date(row: &Row, idx: i32) -> RowResult<NaiveDate> {
    let raw = row.get::<String>(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|error| RowError(format!("column {idx}: invalid date '{raw}': {error}")))
}
