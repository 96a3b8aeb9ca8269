//! crates/todo_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the hosted
//! backend's auth, table and storage APIs, and the host's navigation primitive,
//! all sit behind them.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    AuthEvent, Bucket, CreateTodoInput, Profile, RouteGroup, Session, SignUpCredentials, Todo,
    TodoFilters, TodoStatus, UpdateProfileInput, UpdateTodoInput, UserRole,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid data: {0}")]
    Invalid(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// The stream of session-change notifications handed out by [`AuthService::subscribe`].
pub type AuthEventStream = Pin<Box<dyn Stream<Item = AuthEvent> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Returns the restorable session, if any.
    async fn get_session(&self) -> PortResult<Option<Session>>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<Session>;

    /// Registers an account. Depending on backend settings the new user may have
    /// to confirm the address before a session is issued.
    async fn sign_up(&self, credentials: &SignUpCredentials) -> PortResult<Option<Session>>;

    async fn sign_out(&self) -> PortResult<()>;

    async fn request_password_reset(&self, email: &str, redirect_to: &str) -> PortResult<()>;

    async fn update_password(&self, new_password: &str) -> PortResult<()>;

    /// Opens a standing subscription to session changes (sign-in, sign-out, refresh).
    fn subscribe(&self) -> AuthEventStream;
}

/// Row-level access to the `profiles` and `todos` tables.
///
/// Every todo operation that takes an `owner` filters on it in addition to the id.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Profiles ---
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile>;

    /// All profiles, newest first.
    async fn list_profiles(&self) -> PortResult<Vec<Profile>>;

    async fn update_profile(&self, user_id: Uuid, input: &UpdateProfileInput)
        -> PortResult<Profile>;

    async fn update_role(&self, user_id: Uuid, role: UserRole) -> PortResult<Profile>;

    /// Counts profiles, optionally restricted to one role.
    async fn count_profiles(&self, role: Option<UserRole>) -> PortResult<u64>;

    // --- Todos ---
    /// Todos of one owner, newest first.
    async fn list_todos(&self, owner: Uuid, filters: &TodoFilters) -> PortResult<Vec<Todo>>;

    async fn get_todo(&self, id: Uuid, owner: Uuid) -> PortResult<Todo>;

    async fn create_todo(&self, owner: Uuid, input: &CreateTodoInput) -> PortResult<Todo>;

    async fn update_todo(&self, id: Uuid, owner: Uuid, input: &UpdateTodoInput)
        -> PortResult<Todo>;

    async fn delete_todo(&self, id: Uuid, owner: Uuid) -> PortResult<()>;

    /// `(owner, status)` for every todo, optionally restricted to one owner.
    async fn list_todo_statuses(&self, owner: Option<Uuid>)
        -> PortResult<Vec<(Uuid, TodoStatus)>>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads (or overwrites) an object and returns its public URL.
    async fn upload(
        &self,
        bucket: Bucket,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> PortResult<String>;

    async fn delete(&self, bucket: Bucket, path: &str) -> PortResult<()>;
}

/// The host's navigation primitive.
pub trait Navigator: Send + Sync {
    fn current_route_group(&self) -> RouteGroup;

    fn redirect_to(&self, group: RouteGroup);
}
