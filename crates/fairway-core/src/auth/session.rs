//! Shared signed-in state.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{EntityId, UserProfile};
use crate::query::QueryCache;

/// Bearer token plus the profile it belongs to
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: UserProfile,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Default)]
struct SessionInner {
    auth: RwLock<Option<AuthSession>>,
    cache: QueryCache,
}

/// Explicit client context handed to the gateway and the query façade.
///
/// Clones share the same token, user and query cache.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("auth", &*self.read())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Anonymous session
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth(auth: AuthSession) -> Self {
        let session = Self::new();
        session.set(auth);
        session
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<AuthSession>> {
        self.inner.auth.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<AuthSession>> {
        self.inner
            .auth
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|auth| auth.token.clone())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().as_ref().map(|auth| auth.user.clone())
    }

    pub fn user_id(&self) -> Option<EntityId> {
        self.read().as_ref().map(|auth| auth.user.id.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    /// Signed-in user, or [`Error::NotAuthenticated`].
    pub fn require_user(&self) -> Result<UserProfile> {
        self.user().ok_or(Error::NotAuthenticated)
    }

    /// Replace the signed-in state. Cached queries are dropped when the user
    /// changes.
    pub fn set(&self, auth: AuthSession) {
        let user_changed = {
            let mut current = self.write();
            let changed = current.as_ref().map(|existing| &existing.user.id) != Some(&auth.user.id);
            *current = Some(auth);
            changed
        };
        if user_changed {
            self.inner.cache.invalidate_all();
        }
    }

    /// Swap in a refreshed profile, keeping the token.
    pub fn update_user(&self, user: UserProfile) -> Option<AuthSession> {
        let mut current = self.write();
        let auth = current.as_mut()?;
        auth.user = user;
        Some(auth.clone())
    }

    pub fn clear(&self) {
        *self.write() = None;
        self.inner.cache.invalidate_all();
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }
}
