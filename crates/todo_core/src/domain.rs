//! crates/todo_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport; the adapters
//! translate them to and from their own record types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Returned when a closed enumeration is parsed from an unknown string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

//=========================================================================================
// Closed Enumerations
//=========================================================================================

/// The only authorization signal in the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            other => Err(ParseEnumError {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub const ALL: [TodoStatus; 3] = [
        TodoStatus::Pending,
        TodoStatus::InProgress,
        TodoStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
        }
    }

    /// The quick-action flip: `completed` goes back to `pending`, anything else completes.
    pub fn toggled(self) -> TodoStatus {
        match self {
            TodoStatus::Completed => TodoStatus::Pending,
            _ => TodoStatus::Completed,
        }
    }
}

impl FromStr for TodoStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TodoStatus::Pending),
            "in_progress" => Ok(TodoStatus::InProgress),
            "completed" => Ok(TodoStatus::Completed),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TodoPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoPriority::Low => "low",
            TodoPriority::Medium => "medium",
            TodoPriority::High => "high",
        }
    }
}

impl FromStr for TodoPriority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TodoPriority::Low),
            "medium" => Ok(TodoPriority::Medium),
            "high" => Ok(TodoPriority::High),
            other => Err(ParseEnumError {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TodoPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Authentication
//=========================================================================================

/// The identity carried by a session, as issued by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// An opaque credential bundle issued by the external auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// A session-change notification. The session is the one in effect after the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

#[derive(Debug, Clone)]
pub struct SignUpCredentials {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

//=========================================================================================
// Profiles
//=========================================================================================

/// One profile row per user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Up to two upper-case initials from the full name, `?` when there is none.
    pub fn initials(&self) -> String {
        match self.full_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name
                .split_whitespace()
                .filter_map(|part| part.chars().next())
                .flat_map(char::to_uppercase)
                .take(2)
                .collect(),
            _ => "?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfileInput {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

//=========================================================================================
// Todos
//=========================================================================================

/// A single task, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TodoStatus,
    pub priority: TodoPriority,
    pub image_url: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_date.is_some_and(|due| due < now)
    }

    /// Moves the todo to `status`, stamping `completed_at` the way the
    /// persistence layer does: set on completion, cleared otherwise.
    pub fn set_status(&mut self, status: TodoStatus, completed_at: DateTime<Utc>) {
        self.status = status;
        self.completed_at = (status == TodoStatus::Completed).then_some(completed_at);
    }

    /// Due within the next 24 hours and not yet overdue.
    pub fn is_due_soon(&self, now: DateTime<Utc>) -> bool {
        self.due_date
            .is_some_and(|due| due > now && due - now <= Duration::hours(24))
    }

    /// Whether the row satisfies the given list filters.
    pub fn matches(&self, filters: &TodoFilters) -> bool {
        if filters.status.is_some_and(|s| s != self.status) {
            return false;
        }
        if filters.priority.is_some_and(|p| p != self.priority) {
            return false;
        }
        match filters.search.as_deref() {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                self.title.to_lowercase().contains(&needle)
                    || self
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTodoInput {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<TodoPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

/// A partial update. For `due_date` and `image_url` the outer `Option` means
/// "leave untouched" and `Some(None)` clears the column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTodoInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TodoStatus>,
    pub priority: Option<TodoPriority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub image_url: Option<Option<String>>,
}

impl UpdateTodoInput {
    pub fn status(status: TodoStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// List filters. Also serves as the cache key of a todo list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TodoFilters {
    pub status: Option<TodoStatus>,
    pub priority: Option<TodoPriority>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl TodoStats {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = TodoStatus>,
    {
        statuses
            .into_iter()
            .fold(TodoStats::default(), |mut stats, status| {
                stats.total += 1;
                match status {
                    TodoStatus::Pending => stats.pending += 1,
                    TodoStatus::InProgress => stats.in_progress += 1,
                    TodoStatus::Completed => stats.completed += 1,
                }
                stats
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_admins: u64,
    pub total_todos: usize,
    pub pending_todos: usize,
    pub in_progress_todos: usize,
    pub completed_todos: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithStats {
    #[serde(flatten)]
    pub profile: Profile,
    pub total_todos: usize,
    pub completed_todos: usize,
}

//=========================================================================================
// Navigation and Storage
//=========================================================================================

/// Coarse classification of the current screen. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteGroup {
    Auth,
    App,
    Admin,
}

impl RouteGroup {
    /// The screen a redirect into this group lands on.
    pub fn entry_path(&self) -> &'static str {
        match self {
            RouteGroup::Auth => "/(auth)/login",
            RouteGroup::App => "/(app)",
            RouteGroup::Admin => "/(admin)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    TodoImages,
    Avatars,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::TodoImages => "todo-images",
            Bucket::Avatars => "avatars",
        }
    }
}
