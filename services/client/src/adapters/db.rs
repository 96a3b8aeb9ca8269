//! services/client/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It talks to the hosted
//! backend's Postgres database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use todo_core::domain::{
    CreateTodoInput, Profile, Todo, TodoFilters, TodoStatus, UpdateProfileInput, UpdateTodoInput,
    UserRole,
};
use todo_core::ports::{DatabaseService, PortError, PortResult};
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id, email, full_name, avatar_url, role, created_at, updated_at";
const TODO_COLUMNS: &str = "id, user_id, title, description, status, priority, image_url, \
                            due_date, completed_at, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn port_error(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what()),
        other => PortError::Unexpected(other.to_string()),
    }
}

/// Escapes `ILIKE` wildcards so a search term only matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    email: String,
    full_name: Option<String>,
    avatar_url: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ProfileRecord {
    fn to_domain(self) -> PortResult<Profile> {
        Ok(Profile {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            avatar_url: self.avatar_url,
            role: self
                .role
                .parse()
                .map_err(|e: todo_core::ParseEnumError| PortError::Invalid(e.to_string()))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TodoRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    image_url: Option<String>,
    due_date: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl TodoRecord {
    fn to_domain(self) -> PortResult<Todo> {
        let invalid = |e: todo_core::ParseEnumError| PortError::Invalid(e.to_string());
        Ok(Todo {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            status: self.status.parse().map_err(invalid)?,
            priority: self.priority.parse().map_err(invalid)?,
            image_url: self.image_url,
            due_date: self.due_date,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| port_error(e, || format!("Profile {} not found", user_id)))?
            .to_domain()
    }

    async fn list_profiles(&self) -> PortResult<Vec<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC");
        sqlx::query_as::<_, ProfileRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into_iter()
            .map(ProfileRecord::to_domain)
            .collect()
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        input: &UpdateProfileInput,
    ) -> PortResult<Profile> {
        let sql = format!(
            "UPDATE profiles SET full_name = COALESCE($2, full_name), \
             avatar_url = COALESCE($3, avatar_url) WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(user_id)
            .bind(input.full_name.as_deref())
            .bind(input.avatar_url.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| port_error(e, || format!("Profile {} not found", user_id)))?
            .to_domain()
    }

    async fn update_role(&self, user_id: Uuid, role: UserRole) -> PortResult<Profile> {
        let sql = format!("UPDATE profiles SET role = $2 WHERE id = $1 RETURNING {PROFILE_COLUMNS}");
        sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(user_id)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| port_error(e, || format!("Profile {} not found", user_id)))?
            .to_domain()
    }

    async fn count_profiles(&self, role: Option<UserRole>) -> PortResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM profiles WHERE ($1::text IS NULL OR role = $1)",
        )
        .bind(role.map(|r| r.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    async fn list_todos(&self, owner: Uuid, filters: &TodoFilters) -> PortResult<Vec<Todo>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TODO_COLUMNS} FROM todos WHERE user_id = "));
        query.push_bind(owner);

        if let Some(status) = filters.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(priority) = filters.priority {
            query.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(search) = filters.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = like_pattern(search);
            query
                .push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY created_at DESC");

        query
            .build_query_as::<TodoRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into_iter()
            .map(TodoRecord::to_domain)
            .collect()
    }

    async fn get_todo(&self, id: Uuid, owner: Uuid) -> PortResult<Todo> {
        let sql = format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, TodoRecord>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| port_error(e, || format!("Todo {} not found", id)))?
            .to_domain()
    }

    async fn create_todo(&self, owner: Uuid, input: &CreateTodoInput) -> PortResult<Todo> {
        let sql = format!(
            "INSERT INTO todos (id, user_id, title, description, status, priority, due_date, image_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {TODO_COLUMNS}"
        );
        sqlx::query_as::<_, TodoRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(owner)
            .bind(input.title.trim())
            .bind(input.description.as_deref())
            .bind(TodoStatus::Pending.as_str())
            .bind(input.priority.unwrap_or_default().as_str())
            .bind(input.due_date)
            .bind(input.image_url.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .to_domain()
    }

    async fn update_todo(
        &self,
        id: Uuid,
        owner: Uuid,
        input: &UpdateTodoInput,
    ) -> PortResult<Todo> {
        if input.is_empty() {
            return self.get_todo(id, owner).await;
        }

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE todos SET ");
        {
            let mut sets = query.separated(", ");
            if let Some(title) = &input.title {
                sets.push("title = ").push_bind_unseparated(title.trim().to_string());
            }
            if let Some(description) = &input.description {
                sets.push("description = ").push_bind_unseparated(description.clone());
            }
            if let Some(status) = input.status {
                sets.push("status = ").push_bind_unseparated(status.as_str());
            }
            if let Some(priority) = input.priority {
                sets.push("priority = ").push_bind_unseparated(priority.as_str());
            }
            if let Some(due_date) = input.due_date {
                sets.push("due_date = ").push_bind_unseparated(due_date);
            }
            if let Some(image_url) = &input.image_url {
                sets.push("image_url = ").push_bind_unseparated(image_url.clone());
            }
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(owner)
            .push(format!(" RETURNING {TODO_COLUMNS}"));

        query
            .build_query_as::<TodoRecord>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .ok_or_else(|| PortError::NotFound(format!("Todo {} not found", id)))?
            .to_domain()
    }

    async fn delete_todo(&self, id: Uuid, owner: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Todo {} not found", id)));
        }
        Ok(())
    }

    async fn list_todo_statuses(
        &self,
        owner: Option<Uuid>,
    ) -> PortResult<Vec<(Uuid, TodoStatus)>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT user_id, status FROM todos WHERE ($1::uuid IS NULL OR user_id = $1)",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        rows.into_iter()
            .map(|(user_id, status)| {
                status
                    .parse()
                    .map(|s| (user_id, s))
                    .map_err(|e: todo_core::ParseEnumError| PortError::Invalid(e.to_string()))
            })
            .collect()
    }
}
