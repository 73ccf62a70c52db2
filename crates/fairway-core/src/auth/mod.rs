//! Sign-in flows and session persistence.

mod session;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::gateway::{AuthResponse, RegisterRequest, RemoteGateway};
use crate::models::UserProfile;

pub use session::{AuthSession, Session};

/// Durable storage for the signed-in session (OS keychain, file, memory).
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> Result<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> Result<()>;
    fn clear_session(&self) -> Result<()>;
}

/// Auth flows against the remote service, mirrored into a [`Session`].
#[derive(Clone)]
pub struct AuthService<S: SessionPersistence> {
    gateway: Arc<dyn RemoteGateway>,
    session: Session,
    store: S,
}

impl<S: SessionPersistence> AuthService<S> {
    pub fn new(gateway: Arc<dyn RemoteGateway>, session: Session, store: S) -> Self {
        Self {
            gateway,
            session,
            store,
        }
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Load the persisted session into memory without touching the network.
    pub fn restore_session(&self) -> Result<Option<UserProfile>> {
        let stored = match self.store.load_session() {
            Ok(stored) => stored,
            Err(error) => {
                tracing::warn!("Failed to load persisted session: {}", error);
                return Ok(None);
            }
        };

        Ok(stored.map(|auth| {
            let user = auth.user.clone();
            self.session.set(auth);
            user
        }))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile> {
        validate_credentials(email, password)?;
        let response = self.gateway.login(email.trim(), password).await?;
        self.accept(response)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserProfile> {
        validate_credentials(email, password)?;
        if display_name.trim().is_empty() {
            return Err(Error::Validation("Display name is required".to_string()));
        }

        let request = RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            display_name: display_name.trim().to_string(),
        };
        let response = self.gateway.register(&request).await?;
        self.accept(response)
    }

    /// Re-read the profile from the server. A no-op when signed out.
    pub async fn refresh_profile(&self) -> Result<Option<UserProfile>> {
        if !self.session.is_authenticated() {
            return Ok(None);
        }

        let user = self.gateway.current_user().await?;
        if let Some(auth) = self.session.update_user(user.clone()) {
            self.store.save_session(&auth)?;
        }
        Ok(Some(user))
    }

    pub fn sign_out(&self) -> Result<()> {
        self.session.clear();
        self.store.clear_session()
    }

    fn accept(&self, response: AuthResponse) -> Result<UserProfile> {
        if response.token.trim().is_empty() {
            return Err(Error::Auth(
                "Auth response did not include a token".to_string(),
            ));
        }

        let auth = AuthSession {
            token: response.token,
            user: response.user,
        };
        self.store.save_session(&auth)?;
        let user = auth.user.clone();
        self.session.set(auth);
        tracing::info!("Signed in as {}", user.email);
        Ok(user)
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(Error::Validation("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(Error::Validation("Password is required".to_string()));
    }
    Ok(())
}
