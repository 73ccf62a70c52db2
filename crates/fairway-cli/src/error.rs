use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fairway_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyArgument(&'static str),
    #[error("Invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },
    #[error("Nothing to change; pass at least one of --date, --holes, --score or --tee")]
    EmptyVisitEdit,
    #[error("Not signed in. Run `fairway auth login --email <EMAIL> --password <PASSWORD>` first.")]
    NotSignedIn,
    #[error("Could not resolve a config directory for this platform")]
    NoConfigDir,
    #[error("Another sync is already running")]
    SyncInProgress,
    #[error("Sync incomplete: {0}")]
    SyncFailed(String),
}
