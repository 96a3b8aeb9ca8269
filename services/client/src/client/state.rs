//! services/client/src/client/state.rs
//!
//! Defines the application's shared state.

use crate::client::optimistic::KeyedQueue;
use crate::client::query_cache::QueryCache;
use crate::client::session_store::SessionStore;
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use std::sync::Arc;
use todo_core::ports::{AuthService, DatabaseService, ObjectStorage};
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Services)
//=========================================================================================

/// The shared application state, created once at startup and handed to every service.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthService>,
    pub db: Arc<dyn DatabaseService>,
    pub storage: Arc<dyn ObjectStorage>,
    pub config: Arc<Config>,
    pub session: SessionStore,
    pub cache: Arc<QueryCache>,
    /// Status toggles queue per todo id.
    pub toggles: Arc<KeyedQueue<Uuid>>,
}

impl AppState {
    pub fn new(
        auth: Arc<dyn AuthService>,
        db: Arc<dyn DatabaseService>,
        storage: Arc<dyn ObjectStorage>,
        config: Arc<Config>,
    ) -> Self {
        let session = SessionStore::new(auth.clone(), db.clone());
        let cache = Arc::new(QueryCache::new(config.query_stale_time));
        Self {
            auth,
            db,
            storage,
            config,
            session,
            cache,
            toggles: Arc::new(KeyedQueue::new()),
        }
    }

    /// The signed-in user's id.
    pub fn current_user_id(&self) -> ClientResult<Uuid> {
        self.session.user_id().ok_or(ClientError::NotAuthenticated)
    }

    pub fn require_admin(&self) -> ClientResult<()> {
        if self.session.is_admin() {
            Ok(())
        } else {
            Err(ClientError::AdminRequired)
        }
    }
}
