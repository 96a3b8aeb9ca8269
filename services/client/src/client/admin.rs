//! services/client/src/client/admin.rs
//!
//! Admin-only views over all users. Every operation checks the admin role
//! itself, independently of the navigation guard.

use crate::client::query_cache::with_retries;
use crate::client::state::AppState;
use crate::error::ClientResult;
use std::collections::HashMap;
use std::sync::Arc;
use todo_core::domain::{
    DashboardStats, Profile, Todo, TodoFilters, TodoStats, TodoStatus, UserRole, UserWithStats,
};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct AdminService {
    state: Arc<AppState>,
}

impl AdminService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    fn retries(&self) -> u32 {
        self.state.config.query_retries
    }

    /// All profiles, newest first.
    pub async fn users(&self) -> ClientResult<Vec<Profile>> {
        self.state.require_admin()?;
        Ok(with_retries(self.retries(), || self.state.db.list_profiles()).await?)
    }

    pub async fn user_profile(&self, user_id: Uuid) -> ClientResult<Profile> {
        self.state.require_admin()?;
        Ok(with_retries(self.retries(), || self.state.db.get_profile(user_id)).await?)
    }

    pub async fn user_todos(&self, user_id: Uuid) -> ClientResult<Vec<Todo>> {
        self.state.require_admin()?;
        let filters = TodoFilters::default();
        Ok(with_retries(self.retries(), || self.state.db.list_todos(user_id, &filters)).await?)
    }

    pub async fn update_user_role(&self, user_id: Uuid, role: UserRole) -> ClientResult<Profile> {
        self.state.require_admin()?;
        let profile = self.state.db.update_role(user_id, role).await?;
        info!(%user_id, %role, "User role updated");

        if self.state.session.user_id() == Some(user_id) {
            self.state.session.refresh_profile().await;
        }
        Ok(profile)
    }

    pub async fn dashboard_stats(&self) -> ClientResult<DashboardStats> {
        self.state.require_admin()?;
        let db = &self.state.db;

        let total_users = with_retries(self.retries(), || db.count_profiles(None)).await?;
        let statuses = with_retries(self.retries(), || db.list_todo_statuses(None)).await?;
        let total_admins =
            with_retries(self.retries(), || db.count_profiles(Some(UserRole::Admin))).await?;

        let todos = TodoStats::from_statuses(statuses.into_iter().map(|(_, s)| s));
        Ok(DashboardStats {
            total_users,
            total_admins,
            total_todos: todos.total,
            pending_todos: todos.pending,
            in_progress_todos: todos.in_progress,
            completed_todos: todos.completed,
        })
    }

    /// Every profile with its total and completed todo counts.
    pub async fn users_with_stats(&self) -> ClientResult<Vec<UserWithStats>> {
        self.state.require_admin()?;
        let db = &self.state.db;

        let users = with_retries(self.retries(), || db.list_profiles()).await?;
        let statuses = with_retries(self.retries(), || db.list_todo_statuses(None)).await?;

        let mut counts: HashMap<Uuid, (usize, usize)> = HashMap::new();
        for (owner, status) in statuses {
            let entry = counts.entry(owner).or_default();
            entry.0 += 1;
            if status == TodoStatus::Completed {
                entry.1 += 1;
            }
        }

        Ok(users
            .into_iter()
            .map(|profile| {
                let (total_todos, completed_todos) =
                    counts.get(&profile.id).copied().unwrap_or_default();
                UserWithStats {
                    profile,
                    total_todos,
                    completed_todos,
                }
            })
            .collect())
    }
}
