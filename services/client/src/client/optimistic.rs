//! services/client/src/client/optimistic.rs
//!
//! Optimistic mutations: apply locally first, commit remotely, roll back on
//! failure, reconcile in every case.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Runs one optimistic mutation.
///
/// 1. `snapshot` captures the cached state the mutation will touch (`None` when uncached)
/// 2. `apply` rewrites the cache before the remote call
/// 3. `commit` performs the remote write
/// 4. on failure `rollback` receives the snapshot, when there is one
/// 5. `reconcile` always runs after the commit has resolved
///
/// The commit result is returned unchanged.
pub async fn run_optimistic<S, T, E, Snap, Apply, Commit, CommitFut, Rollback, Reconcile, ReconcileFut>(
    snapshot: Snap,
    apply: Apply,
    commit: Commit,
    rollback: Rollback,
    reconcile: Reconcile,
) -> Result<T, E>
where
    E: Display,
    Snap: FnOnce() -> Option<S>,
    Apply: FnOnce(),
    Commit: FnOnce() -> CommitFut,
    CommitFut: Future<Output = Result<T, E>>,
    Rollback: FnOnce(S),
    Reconcile: FnOnce() -> ReconcileFut,
    ReconcileFut: Future<Output = ()>,
{
    let saved = snapshot();
    apply();

    let result = commit().await;
    if let Err(e) = &result {
        match saved {
            Some(saved) => {
                warn!("Remote write failed, rolling back optimistic update: {}", e);
                rollback(saved);
            }
            None => warn!("Remote write failed, nothing cached to roll back: {}", e),
        }
    }

    reconcile().await;
    result
}

/// Serializes mutations that share a key while letting different keys run
/// concurrently. Each waiter gets its turn in arrival order.
pub struct KeyedQueue<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedQueue<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedQueue<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until every earlier holder of `key` has released its turn.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // Slots nobody holds or waits on any more.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key.clone()).or_default().clone()
        };
        if slot.try_lock().is_err() {
            debug!(?key, "Waiting for an earlier mutation of the same key");
        }
        slot.lock_owned().await
    }
}
