//! services/client/src/client/todos.rs
//!
//! Task queries and mutations for the signed-in user, served through the query cache.

use crate::client::optimistic::run_optimistic;
use crate::client::query_cache::with_retries;
use crate::client::state::AppState;
use crate::client::validation::validate_title;
use crate::error::{ClientError, ClientResult};
use chrono::Utc;
use std::sync::Arc;
use todo_core::domain::{
    CreateTodoInput, Todo, TodoFilters, TodoStats, TodoStatus, UpdateTodoInput,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct TodoService {
    state: Arc<AppState>,
}

impl TodoService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// The signed-in user, with the query cache scoped to them.
    fn owner(&self) -> ClientResult<Uuid> {
        let owner = self.state.current_user_id()?;
        self.state.cache.bind_owner(owner);
        Ok(owner)
    }

    //=====================================================================================
    // Queries
    //=====================================================================================

    /// The caller's todos matching `filters`, newest first.
    pub async fn todos(&self, filters: &TodoFilters) -> ClientResult<Vec<Todo>> {
        self.owner()?;
        if let Some(cached) = self.state.cache.fresh_list(filters) {
            return Ok(cached);
        }
        self.fetch_list(filters).await
    }

    pub async fn todo(&self, id: Uuid) -> ClientResult<Todo> {
        self.owner()?;
        if let Some(cached) = self.state.cache.fresh_detail(id) {
            return Ok(cached);
        }
        self.fetch_detail(id).await
    }

    /// Per-status counts over all of the caller's todos.
    pub async fn stats(&self) -> ClientResult<TodoStats> {
        let owner = self.owner()?;
        if let Some(cached) = self.state.cache.fresh_stats() {
            return Ok(cached);
        }
        let cache = &self.state.cache;
        let fetch = cache.begin_fetch();
        let result = with_retries(self.state.config.query_retries, || {
            self.state.db.list_todo_statuses(Some(owner))
        })
        .await;
        match result {
            Ok(rows) => {
                let stats = TodoStats::from_statuses(rows.into_iter().map(|(_, s)| s));
                cache.finish_stats(fetch, stats);
                Ok(stats)
            }
            Err(e) => {
                cache.abandon(fetch);
                Err(e.into())
            }
        }
    }

    async fn fetch_list(&self, filters: &TodoFilters) -> ClientResult<Vec<Todo>> {
        let owner = self.owner()?;
        let cache = &self.state.cache;
        let fetch = cache.begin_fetch();
        let token = fetch.token().clone();

        let result = tokio::select! {
            _ = token.cancelled() => None,
            result = with_retries(self.state.config.query_retries, || {
                self.state.db.list_todos(owner, filters)
            }) => Some(result),
        };

        match result {
            Some(Ok(todos)) => {
                if cache.finish_list(fetch, filters, todos.clone()) {
                    Ok(todos)
                } else {
                    // Superseded: the cache holds the newer view.
                    Ok(cache.list(filters).unwrap_or(todos))
                }
            }
            Some(Err(e)) => {
                cache.abandon(fetch);
                Err(e.into())
            }
            None => {
                debug!(?filters, "Todo list fetch cancelled");
                cache.abandon(fetch);
                cache.list(filters).ok_or(ClientError::Cancelled)
            }
        }
    }

    async fn fetch_detail(&self, id: Uuid) -> ClientResult<Todo> {
        let owner = self.owner()?;
        let cache = &self.state.cache;
        let fetch = cache.begin_fetch();
        let token = fetch.token().clone();

        let result = tokio::select! {
            _ = token.cancelled() => None,
            result = with_retries(self.state.config.query_retries, || {
                self.state.db.get_todo(id, owner)
            }) => Some(result),
        };

        match result {
            Some(Ok(todo)) => {
                if cache.finish_detail(fetch, todo.clone()) {
                    Ok(todo)
                } else {
                    Ok(cache.detail(id).unwrap_or(todo))
                }
            }
            Some(Err(e)) => {
                cache.abandon(fetch);
                Err(e.into())
            }
            None => {
                cache.abandon(fetch);
                cache.detail(id).ok_or(ClientError::Cancelled)
            }
        }
    }

    //=====================================================================================
    // Mutations
    //=====================================================================================

    /// Creates a todo owned by the caller. New todos always start `pending`.
    pub async fn create_todo(&self, input: CreateTodoInput) -> ClientResult<Todo> {
        let owner = self.owner()?;
        validate_title(&input.title)?;

        let todo = with_retries(self.state.config.mutation_retries, || {
            self.state.db.create_todo(owner, &input)
        })
        .await?;
        info!(id = %todo.id, "Todo created");

        self.state.cache.invalidate_lists();
        Ok(todo)
    }

    pub async fn update_todo(&self, id: Uuid, input: UpdateTodoInput) -> ClientResult<Todo> {
        let owner = self.owner()?;
        if let Some(title) = &input.title {
            validate_title(title)?;
        }
        if input.is_empty() {
            return Err(ClientError::Validation("nothing to update".to_string()));
        }

        let todo = with_retries(self.state.config.mutation_retries, || {
            self.state.db.update_todo(id, owner, &input)
        })
        .await?;

        self.state.cache.invalidate_lists();
        self.state.cache.invalidate_detail(id);
        Ok(todo)
    }

    pub async fn delete_todo(&self, id: Uuid) -> ClientResult<()> {
        let owner = self.owner()?;
        with_retries(self.state.config.mutation_retries, || {
            self.state.db.delete_todo(id, owner)
        })
        .await?;
        info!(%id, "Todo deleted");

        self.state.cache.invalidate_lists();
        self.state.cache.remove_detail(id);
        Ok(())
    }

    /// Flips a todo between `completed` and `pending` optimistically.
    ///
    /// Toggles of the same todo run one after another; each derives its target
    /// from the cached status at its turn, falling back to `current_status`
    /// when the todo is not cached.
    pub async fn toggle_status(&self, id: Uuid, current_status: TodoStatus) -> ClientResult<Todo> {
        let owner = self.owner()?;
        let _turn = self.state.toggles.acquire(id).await;

        let cache = &self.state.cache;
        cache.cancel_fetches();

        let next = cache.cached_status(id).unwrap_or(current_status).toggled();
        let update = UpdateTodoInput::status(next);
        let db = &self.state.db;
        let now = Utc::now();

        let todo = run_optimistic(
            || cache.snapshot_todo(id),
            || cache.patch_todo(id, move |t| t.set_status(next, now)),
            || db.update_todo(id, owner, &update),
            |snapshot| cache.restore_todo(snapshot),
            || self.reconcile(id),
        )
        .await?;

        debug!(%id, status = %next, "Todo status toggled");
        Ok(todo)
    }

    /// Drops the pending patch of `id`, then refetches every cached list and
    /// the cached detail view of `id`. Patches of other toggles still in
    /// flight are laid over the refetched rows.
    async fn reconcile(&self, id: Uuid) {
        let cache = &self.state.cache;
        cache.release_patch(id);
        cache.invalidate_lists();
        cache.invalidate_detail(id);

        for filters in cache.list_keys() {
            if let Err(e) = self.fetch_list(&filters).await {
                warn!(?filters, "Reconciliation refetch failed: {}", e);
            }
        }
        if cache.detail(id).is_some() {
            if let Err(e) = self.fetch_detail(id).await {
                warn!(%id, "Reconciliation refetch failed: {}", e);
            }
        }
    }
}
