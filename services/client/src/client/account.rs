//! services/client/src/client/account.rs
//!
//! Sign-in, sign-up, sign-out and profile maintenance for the current user.
//!
//! Sign-in and sign-up do not touch the session store directly: the auth
//! service announces the new session on its event stream and the store picks
//! it up from there.

use crate::client::state::AppState;
use crate::client::validation::{validate_email, validate_password};
use crate::error::{ClientError, ClientResult};
use std::sync::Arc;
use todo_core::domain::{Profile, Session, SignUpCredentials, UpdateProfileInput};
use tracing::info;

#[derive(Clone)]
pub struct AccountService {
    state: Arc<AppState>,
}

impl AccountService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<Session> {
        validate_email(email)?;
        if password.is_empty() {
            return Err(ClientError::Validation(
                "password is required".to_string(),
            ));
        }
        let session = self.state.auth.sign_in_with_password(email, password).await?;
        info!(user_id = %session.user_id(), "Signed in");
        Ok(session)
    }

    /// Registers an account. `None` when the backend requires email confirmation first.
    pub async fn sign_up(&self, credentials: SignUpCredentials) -> ClientResult<Option<Session>> {
        validate_email(&credentials.email)?;
        validate_password(&credentials.password)?;
        let session = self.state.auth.sign_up(&credentials).await?;
        info!(confirmed = session.is_some(), "Account registered");
        Ok(session)
    }

    /// Signs out and forgets every cached query. On failure the session and
    /// the cache are left as they were.
    pub async fn sign_out(&self) -> ClientResult<()> {
        self.state.session.sign_out().await?;
        self.state.cache.clear();
        info!("Signed out");
        Ok(())
    }

    /// Updates the caller's own profile and reloads it into the session store.
    pub async fn update_profile(&self, input: UpdateProfileInput) -> ClientResult<Profile> {
        let user_id = self.state.current_user_id()?;
        let profile = self.state.db.update_profile(user_id, &input).await?;
        self.state.session.refresh_profile().await;
        Ok(profile)
    }

    pub async fn request_password_reset(&self, email: &str) -> ClientResult<()> {
        validate_email(email)?;
        self.state
            .auth
            .request_password_reset(email, &self.state.config.password_reset_redirect)
            .await?;
        Ok(())
    }

    pub async fn update_password(&self, new_password: &str) -> ClientResult<()> {
        self.state.current_user_id()?;
        validate_password(new_password)?;
        self.state.auth.update_password(new_password).await?;
        Ok(())
    }
}
