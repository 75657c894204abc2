//! Single-flight table for concurrent fetches.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// A fetch whose outcome may be awaited by any number of callers.
pub type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

type Slots<K, V, E> = HashMap<K, SharedFetch<V, E>>;

/// At most one live fetch per key.
///
/// The first caller for a key installs the producer's future; later callers
/// receive a clone of the same shared future until it settles, at which point
/// the slot is cleared. A settled error is not remembered, so the next call
/// starts a fresh fetch.
///
/// A slot whose every caller has gone away is abandoned: it no longer counts
/// as live, a caller for the same key resumes it, and it is reclaimed when a
/// fetch for another key starts.
pub struct InflightTable<K, V, E> {
    slots: Arc<Mutex<Slots<K, V, E>>>,
}

impl<K, V, E> Clone for InflightTable<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K, V, E> Default for InflightTable<K, V, E> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V, E> InflightTable<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the live fetch for `key`, or start one with `producer`.
    ///
    /// `producer` is only invoked when no fetch is live.
    pub fn dedupe<F, Fut>(&self, key: K, producer: F) -> SharedFetch<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut slots = lock(&self.slots);
        if let Some(live) = slots.get(&key) {
            debug!(key = ?key, "Joining in-flight fetch");
            return live.clone();
        }
        prune_abandoned(&mut slots);

        let fetch = producer();
        let slots_ref = Arc::clone(&self.slots);
        let slot_key = key.clone();
        let shared = async move {
            let result = fetch.await;
            lock(&slots_ref).remove(&slot_key);
            result
        }
        .boxed()
        .shared();

        slots.insert(key, shared.clone());
        shared
    }

    /// Whether a fetch for `key` is being awaited by someone.
    pub fn contains(&self, key: &K) -> bool {
        lock(&self.slots).get(key).is_some_and(is_held)
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.slots).is_empty()
    }

    /// Drop every slot. Fetches already being awaited keep running for their
    /// current holders.
    pub fn clear(&self) {
        lock(&self.slots).clear();
    }
}

/// The table keeps one handle of its own; anything above that is a caller.
fn is_held<V, E>(fetch: &SharedFetch<V, E>) -> bool {
    fetch.strong_count().is_some_and(|n| n > 1)
}

fn prune_abandoned<K, V, E>(slots: &mut Slots<K, V, E>)
where
    K: Debug,
{
    slots.retain(|key, fetch| {
        let held = is_held(fetch);
        if !held {
            debug!(key = ?key, "Dropping abandoned fetch");
        }
        held
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
