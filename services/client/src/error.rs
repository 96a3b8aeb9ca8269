//! services/client/src/error.rs
//!
//! Defines the primary error type for the client service.

use crate::config::ConfigError;
use todo_core::ports::PortError;

/// The primary error type for the `client` service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error from a migration run at startup.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a transport failure talking to the hosted backend.
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),

    /// The operation needs a signed-in user.
    #[error("User not authenticated")]
    NotAuthenticated,

    /// An admin-only operation was attempted without the admin role.
    #[error("Unauthorized: Admin access required")]
    AdminRequired,

    /// A query was cancelled before producing data.
    #[error("Query cancelled")]
    Cancelled,

    /// Caller input rejected before reaching the backend.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// A convenience type alias for `Result<T, ClientError>`.
pub type ClientResult<T> = Result<T, ClientError>;
