//! Error types for fairway-core

use thiserror::Error;

/// Result type alias using fairway-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fairway-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invariant violation caused by the caller (never retried)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Underlying persistence fault
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Remote service could not be reached or answered with an error
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation needs a signed-in user
    #[error("Not signed in")]
    NotAuthenticated,

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session persistence or auth payload problem
    #[error("Auth error: {0}")]
    Auth(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns the network error when this is one.
    pub const fn as_network(&self) -> Option<&NetworkError> {
        match self {
            Self::Network(error) => Some(error),
            _ => None,
        }
    }
}

/// A failed statement against the local store.
///
/// Carries the statement text and rendered parameters so the failing call can
/// be identified from logs alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Storage error: {message} (statement: {statement}, params: {params:?})")]
pub struct StorageError {
    pub statement: String,
    pub params: Vec<String>,
    pub message: String,
}

impl StorageError {
    pub fn new(
        statement: impl Into<String>,
        params: &[libsql::Value],
        message: impl ToString,
    ) -> Self {
        Self {
            statement: compact_statement(&statement.into()),
            params: params.iter().map(render_value).collect(),
            message: message.to_string(),
        }
    }
}

fn compact_statement(statement: &str) -> String {
    statement.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_value(value: &libsql::Value) -> String {
    match value {
        libsql::Value::Null => "NULL".to_string(),
        libsql::Value::Integer(value) => value.to_string(),
        libsql::Value::Real(value) => value.to_string(),
        libsql::Value::Text(value) => format!("'{value}'"),
        libsql::Value::Blob(value) => format!("<{} bytes>", value.len()),
    }
}

/// Errors raised by the remote gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The request never reached the server
    #[error("Connection failed: {0}")]
    Connectivity(String),

    /// The request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape
    #[error("Invalid response payload: {0}")]
    Decode(String),
}

impl NetworkError {
    /// HTTP status if the server answered.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The resource is already gone on the server.
    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404 | 410))
    }

    /// Whether a later attempt could succeed without caller changes.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Connectivity(_) | Self::Timeout => true,
            Self::Status { status, .. } => matches!(*status, 408 | 409 | 423 | 425 | 429 | 500..=599),
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Self::Connectivity(error.to_string())
        }
    }
}
