//! services/client/src/client/guard.rs
//!
//! The Navigation Guard keeps the visible route group consistent with the
//! authorization state held by the session store.

use crate::client::session_store::{is_admin, is_authenticated, AuthState, SessionStore};
use std::sync::Arc;
use todo_core::domain::RouteGroup;
use todo_core::ports::Navigator;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Maps auth state and the current route group to the group the user must be
/// sent to, if any. Nothing is decided before the store is initialized.
///
/// Rules, first match wins:
/// 1. signed out outside `auth` goes to `auth`
/// 2. signed in inside `auth` goes to `app`
/// 3. non-admin inside `admin` goes to `app`
pub fn redirect_target(state: &AuthState, current: RouteGroup) -> Option<RouteGroup> {
    if !state.is_initialized {
        return None;
    }

    let authenticated = is_authenticated(state);
    if !authenticated && current != RouteGroup::Auth {
        Some(RouteGroup::Auth)
    } else if authenticated && current == RouteGroup::Auth {
        Some(RouteGroup::App)
    } else if current == RouteGroup::Admin && !is_admin(state) {
        Some(RouteGroup::App)
    } else {
        None
    }
}

pub struct NavigationGuard {
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
}

impl NavigationGuard {
    pub fn new(store: SessionStore, navigator: Arc<dyn Navigator>) -> Self {
        Self { store, navigator }
    }

    /// Evaluates the rules once against the store's current state. Call this
    /// after every route change; store changes are covered by [`Self::run`].
    pub fn evaluate(&self) -> Option<RouteGroup> {
        self.evaluate_state(&self.store.snapshot())
    }

    fn evaluate_state(&self, state: &AuthState) -> Option<RouteGroup> {
        let current = self.navigator.current_route_group();
        let target = redirect_target(state, current)?;
        info!(from = ?current, to = target.entry_path(), "Redirecting");
        self.navigator.redirect_to(target);
        Some(target)
    }

    /// Re-evaluates after every change of the session store.
    pub async fn run(self) {
        let mut changes = self.store.subscribe();
        loop {
            let state = changes.borrow_and_update().clone();
            self.evaluate_state(&state);
            if changes.changed().await.is_err() {
                debug!("Session store dropped, stopping navigation guard");
                break;
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
