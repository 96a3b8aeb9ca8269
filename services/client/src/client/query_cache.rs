//! services/client/src/client/query_cache.rs
//!
//! Process-wide cache of todo query results.
//!
//! Every fetch is stamped with the cache generation it started under. Cancelling
//! fetches bumps the generation, so a response that arrives after cancellation
//! can never overwrite a value written in the meantime (such as an optimistic update).
//!
//! The cache belongs to one user at a time. Binding it to a different owner drops
//! everything cached for the previous one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use todo_core::domain::{Todo, TodoFilters, TodoStats, TodoStatus};
use todo_core::ports::{PortError, PortResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

struct Entry<T> {
    data: T,
    written_at: Instant,
    stale: bool,
}

impl<T> Entry<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            written_at: Instant::now(),
            stale: false,
        }
    }

    fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.stale && self.written_at.elapsed() < stale_time
    }
}

/// An optimistic rewrite of one todo, kept until its remote write settles.
type TodoPatch = Arc<dyn Fn(&mut Todo) + Send + Sync>;

#[derive(Default)]
struct Inner {
    owner: Option<Uuid>,
    lists: HashMap<TodoFilters, Entry<Vec<Todo>>>,
    details: HashMap<Uuid, Entry<Todo>>,
    stats: Option<Entry<TodoStats>>,
    generation: u64,
    next_fetch_id: u64,
    in_flight: HashMap<u64, CancellationToken>,
    pending: HashMap<Uuid, TodoPatch>,
}

impl Inner {
    fn cancel_fetches(&mut self) -> usize {
        self.generation += 1;
        let cancelled = self.in_flight.len();
        for (_, token) in self.in_flight.drain() {
            token.cancel();
        }
        cancelled
    }

    fn reset(&mut self) {
        self.cancel_fetches();
        self.lists.clear();
        self.details.clear();
        self.stats = None;
        self.pending.clear();
    }

    /// Re-applies the optimistic patch of `todo`, if one is still pending.
    fn overlay(&self, todo: &mut Todo) {
        if let Some(patch) = self.pending.get(&todo.id) {
            patch(todo);
        }
    }
}

/// A fetch registered with the cache. Hand it back to one of the `finish_*`
/// methods once the response arrives.
#[derive(Debug)]
pub struct Fetch {
    id: u64,
    generation: u64,
    token: CancellationToken,
}

impl Fetch {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// The cached state of one todo before an optimistic write touched it.
#[derive(Debug, Clone)]
pub struct TodoSnapshot {
    id: Uuid,
    in_lists: Vec<(TodoFilters, Todo)>,
    detail: Option<Todo>,
}

pub struct QueryCache {
    inner: Mutex<Inner>,
    stale_time: Duration,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            stale_time,
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Scopes the cache to `owner`. A different owner than the current one
    /// cancels in-flight fetches and drops every cached entry.
    pub fn bind_owner(&self, owner: Uuid) {
        let mut inner = self.inner();
        if inner.owner == Some(owner) {
            return;
        }
        if let Some(previous) = inner.owner {
            debug!(%previous, %owner, "Cache owner changed, dropping cached queries");
        }
        inner.reset();
        inner.owner = Some(owner);
    }

    // --- Fetch bookkeeping ---

    pub fn begin_fetch(&self) -> Fetch {
        let mut inner = self.inner();
        let id = inner.next_fetch_id;
        inner.next_fetch_id += 1;
        let token = CancellationToken::new();
        inner.in_flight.insert(id, token.clone());
        Fetch {
            id,
            generation: inner.generation,
            token,
        }
    }

    /// Cancels every in-flight fetch and invalidates their results.
    pub fn cancel_fetches(&self) {
        let cancelled = self.inner().cancel_fetches();
        if cancelled > 0 {
            debug!(cancelled, "Cancelled in-flight todo fetches");
        }
    }

    /// Drops the bookkeeping of a fetch and reports whether its result may be written.
    fn settle(inner: &mut Inner, fetch: &Fetch) -> bool {
        inner.in_flight.remove(&fetch.id);
        fetch.generation == inner.generation && !fetch.token.is_cancelled()
    }

    /// Writes a list response, with pending optimistic patches laid over it.
    pub fn finish_list(&self, fetch: Fetch, filters: &TodoFilters, mut data: Vec<Todo>) -> bool {
        let mut inner = self.inner();
        if !Self::settle(&mut inner, &fetch) {
            debug!(?filters, "Discarding superseded todo list response");
            return false;
        }
        data.iter_mut().for_each(|t| inner.overlay(t));
        inner.lists.insert(filters.clone(), Entry::new(data));
        true
    }

    pub fn finish_detail(&self, fetch: Fetch, mut todo: Todo) -> bool {
        let mut inner = self.inner();
        if !Self::settle(&mut inner, &fetch) {
            debug!(id = %todo.id, "Discarding superseded todo response");
            return false;
        }
        inner.overlay(&mut todo);
        inner.details.insert(todo.id, Entry::new(todo));
        true
    }

    pub fn finish_stats(&self, fetch: Fetch, stats: TodoStats) -> bool {
        let mut inner = self.inner();
        if !Self::settle(&mut inner, &fetch) {
            return false;
        }
        inner.stats = Some(Entry::new(stats));
        true
    }

    /// Drops the bookkeeping of a fetch that produced no data.
    pub fn abandon(&self, fetch: Fetch) {
        self.inner().in_flight.remove(&fetch.id);
    }

    // --- Reads ---

    pub fn fresh_list(&self, filters: &TodoFilters) -> Option<Vec<Todo>> {
        let inner = self.inner();
        inner
            .lists
            .get(filters)
            .filter(|e| e.is_fresh(self.stale_time))
            .map(|e| e.data.clone())
    }

    /// The cached list regardless of freshness.
    pub fn list(&self, filters: &TodoFilters) -> Option<Vec<Todo>> {
        self.inner().lists.get(filters).map(|e| e.data.clone())
    }

    pub fn list_keys(&self) -> Vec<TodoFilters> {
        self.inner().lists.keys().cloned().collect()
    }

    pub fn fresh_detail(&self, id: Uuid) -> Option<Todo> {
        let inner = self.inner();
        inner
            .details
            .get(&id)
            .filter(|e| e.is_fresh(self.stale_time))
            .map(|e| e.data.clone())
    }

    pub fn detail(&self, id: Uuid) -> Option<Todo> {
        self.inner().details.get(&id).map(|e| e.data.clone())
    }

    pub fn fresh_stats(&self) -> Option<TodoStats> {
        let inner = self.inner();
        inner
            .stats
            .as_ref()
            .filter(|e| e.is_fresh(self.stale_time))
            .map(|e| e.data)
    }

    /// The status of a todo as currently cached, preferring the detail view.
    pub fn cached_status(&self, id: Uuid) -> Option<TodoStatus> {
        let inner = self.inner();
        inner.details.get(&id).map(|e| e.data.status).or_else(|| {
            inner
                .lists
                .values()
                .find_map(|e| e.data.iter().find(|t| t.id == id).map(|t| t.status))
        })
    }

    // --- Writes ---

    pub fn set_list(&self, filters: TodoFilters, data: Vec<Todo>) {
        self.inner().lists.insert(filters, Entry::new(data));
    }

    /// Captures every cached copy of one todo. `None` when it is not cached anywhere.
    pub fn snapshot_todo(&self, id: Uuid) -> Option<TodoSnapshot> {
        let inner = self.inner();
        let in_lists: Vec<_> = inner
            .lists
            .iter()
            .filter_map(|(filters, e)| {
                e.data
                    .iter()
                    .find(|t| t.id == id)
                    .map(|t| (filters.clone(), t.clone()))
            })
            .collect();
        let detail = inner.details.get(&id).map(|e| e.data.clone());
        if in_lists.is_empty() && detail.is_none() {
            return None;
        }
        Some(TodoSnapshot {
            id,
            in_lists,
            detail,
        })
    }

    /// Rewrites every cached copy of one todo in place. The patch stays pending
    /// and is re-applied to refetched copies until [`Self::release_patch`] or
    /// [`Self::restore_todo`].
    pub fn patch_todo<F>(&self, id: Uuid, patch: F)
    where
        F: Fn(&mut Todo) + Send + Sync + 'static,
    {
        let patch: TodoPatch = Arc::new(patch);
        let mut inner = self.inner();
        for entry in inner.lists.values_mut() {
            entry.data.iter_mut().filter(|t| t.id == id).for_each(|t| patch(t));
        }
        if let Some(entry) = inner.details.get_mut(&id) {
            patch(&mut entry.data);
        }
        inner.pending.insert(id, patch);
    }

    /// Stops re-applying the pending patch of `id`; the next fetch shows the server copy.
    pub fn release_patch(&self, id: Uuid) {
        self.inner().pending.remove(&id);
    }

    /// Puts the captured copies of one todo back and drops its pending patch.
    /// Other items in the same lists are left as they are now.
    pub fn restore_todo(&self, snapshot: TodoSnapshot) {
        let mut inner = self.inner();
        inner.pending.remove(&snapshot.id);
        for (filters, saved) in snapshot.in_lists {
            if let Some(entry) = inner.lists.get_mut(&filters) {
                if let Some(slot) = entry.data.iter_mut().find(|t| t.id == snapshot.id) {
                    *slot = saved;
                }
            }
        }
        if let Some(saved) = snapshot.detail {
            match inner.details.get_mut(&snapshot.id) {
                Some(entry) => entry.data = saved,
                None => {
                    inner.details.insert(snapshot.id, Entry::new(saved));
                }
            }
        }
    }

    // --- Invalidation ---

    pub fn invalidate_lists(&self) {
        let mut inner = self.inner();
        inner.lists.values_mut().for_each(|e| e.stale = true);
        if let Some(stats) = inner.stats.as_mut() {
            stats.stale = true;
        }
    }

    pub fn invalidate_detail(&self, id: Uuid) {
        if let Some(entry) = self.inner().details.get_mut(&id) {
            entry.stale = true;
        }
    }

    pub fn remove_detail(&self, id: Uuid) {
        self.inner().details.remove(&id);
    }

    /// Forgets everything, including the owner, and cancels in-flight fetches.
    pub fn clear(&self) {
        let mut inner = self.inner();
        inner.reset();
        inner.owner = None;
    }
}

//=========================================================================================
// Retry Policy
//=========================================================================================

/// Delay before retry number `attempt` (0-based): 1s doubling, capped at 30s.
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(1000u64.saturating_mul(1 << attempt.min(5)).min(30_000))
}

/// Runs `op`, retrying transient failures up to `retries` more times.
/// Not-found, authorization and validation errors are returned immediately.
pub async fn with_retries<T, F, Fut>(retries: u32, mut op: F) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(PortError::Unexpected(msg)) if attempt < retries => {
                let delay = retry_delay(attempt);
                warn!(attempt = attempt + 1, ?delay, "Retrying after error: {}", msg);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
