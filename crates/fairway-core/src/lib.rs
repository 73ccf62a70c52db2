//! fairway-core - Core library for Fairway
//!
//! Local-first data layer for tracking golf course visits: the local store,
//! entity repositories, the remote gateway, push/pull sync and the query
//! façade used by every front end (CLI today).

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod query;
pub mod services;
pub mod sync;
pub mod util;

pub use auth::{AuthService, AuthSession, Session, SessionPersistence};
pub use config::ClientConfig;
pub use error::{Error, NetworkError, Result};
pub use gateway::{HttpGateway, RemoteGateway};
pub use models::EntityId;
pub use query::{CacheScope, FairwayClient, Mutation};
pub use services::DatabaseService;
pub use sync::{SyncEngine, SyncStatus, SyncTrigger};
