//! Database connection management

use crate::error::{Result, StorageError};
use libsql::{Builder, Connection, Database as LibSqlDatabase, Row, Value};
use std::path::Path;

use super::migrations;
use super::store::{self, ExecuteResult, RowResult};

/// Database wrapper for a local libSQL connection
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        Self::open_local(&path_str).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_local(":memory:").await
    }

    async fn open_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|error| StorageError::new(format!("open {path}"), &[], error))?;
        let conn = db
            .connect()
            .map_err(|error| StorageError::new(format!("connect {path}"), &[], error))?;

        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        tracing::debug!("Opened database at {path}");
        Ok(database)
    }

    async fn configure(&self) -> Result<()> {
        // In-memory databases reject WAL
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        store::execute(&self.conn, "PRAGMA foreign_keys = ON;", Vec::new()).await?;
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Run a mutating statement
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ExecuteResult> {
        store::execute(&self.conn, sql, params).await
    }

    /// Run a query and decode each row
    pub async fn query_map<T, F>(&self, sql: &str, params: Vec<Value>, map: F) -> Result<Vec<T>>
    where
        F: Fn(&Row) -> RowResult<T>,
    {
        store::query_map(&self.conn, sql, params, map).await
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
