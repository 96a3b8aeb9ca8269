//! services/client/src/client/session_store.rs
//!
//! The Session/Role Store: the single process-wide answer to "who is signed in
//! and what may they do". State lives in a `watch` channel so the navigation
//! guard and any other observer can react to every change.

use futures::StreamExt;
use std::sync::{Arc, Mutex};
use todo_core::domain::{AuthEvent, AuthUser, Profile, Session, UserRole};
use todo_core::ports::{AuthEventStream, AuthService, DatabaseService, PortResult};
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

//=========================================================================================
// Stored State and Derived Views
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub session: Option<Session>,
    /// Always the identity of `session`.
    pub user: Option<AuthUser>,
    pub profile: Option<Profile>,
    pub is_loading: bool,
    pub is_initialized: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            user: None,
            profile: None,
            is_loading: true,
            is_initialized: false,
        }
    }
}

pub fn is_authenticated(state: &AuthState) -> bool {
    state.session.is_some()
}

pub fn is_admin(state: &AuthState) -> bool {
    state.profile.as_ref().is_some_and(Profile::is_admin)
}

pub fn user_role(state: &AuthState) -> Option<UserRole> {
    state.profile.as_ref().map(|p| p.role)
}

//=========================================================================================
// The Store
//=========================================================================================

/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct SessionStore {
    auth: Arc<dyn AuthService>,
    db: Arc<dyn DatabaseService>,
    state: Arc<watch::Sender<AuthState>>,
    initialized: Arc<OnceCell<()>>,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionStore {
    pub fn new(auth: Arc<dyn AuthService>, db: Arc<dyn DatabaseService>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            auth,
            db,
            state: Arc::new(state),
            initialized: Arc::new(OnceCell::new()),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    // --- Reads ---

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// A receiver that is notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        is_authenticated(&self.state.borrow())
    }

    pub fn is_admin(&self) -> bool {
        is_admin(&self.state.borrow())
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.state.borrow().user.as_ref().map(|u| u.id)
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state.borrow().profile.clone()
    }

    // --- Setters ---

    /// Replaces the session and its derived user. A profile that belongs to a
    /// different identity than the new session is dropped with it.
    pub fn set_session(&self, session: Option<Session>) {
        self.state.send_modify(|state| {
            let user = session.as_ref().map(|s| s.user.clone());
            let new_id = user.as_ref().map(|u| u.id);
            if state.profile.as_ref().map(|p| p.id) != new_id {
                state.profile = None;
            }
            state.user = user;
            state.session = session;
        });
    }

    pub fn set_profile(&self, profile: Option<Profile>) {
        self.state.send_modify(|state| state.profile = profile);
    }

    pub fn set_loading(&self, is_loading: bool) {
        self.state.send_modify(|state| state.is_loading = is_loading);
    }

    // --- Lifecycle ---

    /// Restores any existing session, loads its profile and starts listening for
    /// session changes. Runs once per store; concurrent and repeated calls all
    /// wait for that single run.
    pub async fn initialize(&self) {
        self.initialized.get_or_init(|| self.run_initialize()).await;
    }

    async fn run_initialize(&self) {
        self.set_loading(true);

        // Subscribe before asking for the session so no change in between is lost.
        let events = self.auth.subscribe();

        match self.auth.get_session().await {
            Ok(Some(session)) => {
                debug!(user_id = %session.user_id(), "Restored existing session");
                self.set_session(Some(session));
                self.refresh_profile().await;
            }
            Ok(None) => debug!("No session to restore"),
            Err(e) => error!("Error initializing auth: {}", e),
        }

        self.start_listener(events);

        self.state.send_modify(|state| {
            state.is_loading = false;
            state.is_initialized = true;
        });
        info!(
            authenticated = self.is_authenticated(),
            admin = self.is_admin(),
            "Auth store initialized"
        );
    }

    fn start_listener(&self, mut events: AuthEventStream) {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                store.handle_auth_event(event).await;
            }
            debug!("Auth event stream closed");
        });
        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Applies one session-change notification. The most recently delivered
    /// session always wins.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        info!(kind = ?event.kind, "Auth state changed");
        let has_session = event.session.is_some();
        self.set_session(event.session);
        if has_session {
            self.refresh_profile().await;
        } else {
            self.set_profile(None);
        }
    }

    /// Re-reads the current user's profile. Failures are logged and keep the
    /// previous profile in place.
    pub async fn refresh_profile(&self) {
        let Some(user_id) = self.user_id() else {
            return;
        };

        match self.db.get_profile(user_id).await {
            Ok(profile) => {
                let applied = self.state.send_if_modified(|state| {
                    let current = state.user.as_ref().map(|u| u.id);
                    if current == Some(profile.id) {
                        state.profile = Some(profile);
                        true
                    } else {
                        false
                    }
                });
                if !applied {
                    debug!(%user_id, "Discarding profile of a superseded session");
                }
            }
            Err(e) => error!(%user_id, "Error refreshing profile: {}", e),
        }
    }

    /// Signs out through the auth service. On failure the session is kept and
    /// the error is returned to the caller.
    pub async fn sign_out(&self) -> PortResult<()> {
        self.set_loading(true);
        let result = self.auth.sign_out().await;
        match &result {
            Ok(()) => self.state.send_modify(|state| {
                state.session = None;
                state.user = None;
                state.profile = None;
            }),
            Err(e) => error!("Error during sign out: {}", e),
        }
        self.set_loading(false);
        result
    }

    /// Stops the session-change listener.
    pub fn shutdown(&self) {
        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(id: Uuid) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now(),
            user: AuthUser { id, email: None },
        }
    }

    fn profile(id: Uuid, role: UserRole) -> Profile {
        let now = Utc::now();
        Profile {
            id,
            email: "someone@example.com".to_string(),
            full_name: None,
            avatar_url: None,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn authenticated_tracks_session_presence() {
        let mut state = AuthState::default();
        assert!(!is_authenticated(&state));
        state.session = Some(session(Uuid::new_v4()));
        assert!(is_authenticated(&state));
    }

    #[test]
    fn admin_requires_a_profile_with_admin_role() {
        let id = Uuid::new_v4();
        let mut state = AuthState::default();
        assert!(!is_admin(&state));
        assert_eq!(user_role(&state), None);

        state.profile = Some(profile(id, UserRole::User));
        assert!(!is_admin(&state));

        state.profile = Some(profile(id, UserRole::Admin));
        assert!(is_admin(&state));
        assert_eq!(user_role(&state), Some(UserRole::Admin));
    }

    #[test]
    fn default_state_is_loading_and_uninitialized() {
        let state = AuthState::default();
        assert!(state.is_loading);
        assert!(!state.is_initialized);
    }
}
