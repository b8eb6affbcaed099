// src/cache.rs

//! Keyed TTL cache that coalesces concurrent fetches.
//!
//! A lookup returns the cached value while `now < expires_at`. Otherwise the
//! first caller starts the fetch and every caller arriving before it settles
//! awaits the same shared future, so one key never has two fetches
//! outstanding. Successful results are stored with `expires_at = now + ttl`;
//! failures reach every awaiter and are not cached. Expired entries are swept
//! on every access.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::utils::clock::Clock;

/// A cached value and the instant it stops being served.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: DateTime<Utc>,
}

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct CacheState<K, V, E> {
    entries: HashMap<K, CacheEntry<V>>,
    in_flight: HashMap<K, SharedFetch<V, E>>,
}

impl<K: Eq + Hash, V, E> CacheState<K, V, E> {
    fn prune(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the in-flight marker for a key when the fetch settles, whether it
/// returned a value, an error, or unwound.
struct InFlightGuard<K: Eq + Hash, V, E> {
    state: Arc<Mutex<CacheState<K, V, E>>>,
    key: Option<K>,
}

impl<K: Eq + Hash, V, E> Drop for InFlightGuard<K, V, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.state).in_flight.remove(&key);
        }
    }
}

/// TTL cache with request coalescing.
pub struct TtlCache<K, V, E> {
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CacheState<K, V, E>>>,
}

impl<K, V, E> TtlCache<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
        }
    }

    /// Return the fresh value for `key`, or populate it with `fetch`.
    ///
    /// `fetch` is only invoked when no fresh entry and no in-flight fetch
    /// exist for the key. It runs while the cache lock is held, so it must
    /// only build the future and not touch this cache.
    ///
    /// A caller that stops waiting does not cancel the fetch for others: the
    /// shared future stays registered and the next caller for the key drives
    /// it to completion.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let pending = {
            let mut state = lock(&self.state);
            state.prune(self.clock.now());

            if let Some(entry) = state.entries.get(&key) {
                return Ok(entry.value.clone());
            }

            match state.in_flight.get(&key) {
                Some(pending) => pending.clone(),
                None => {
                    let pending = self.populate(key.clone(), fetch());
                    state.in_flight.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    fn populate<Fut>(&self, key: K, fetch: Fut) -> SharedFetch<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let ttl = self.ttl;

        async move {
            let guard = InFlightGuard {
                state: Arc::clone(&state),
                key: Some(key.clone()),
            };

            let result = fetch.await;
            if let Ok(value) = &result {
                let expires_at = clock
                    .now()
                    .checked_add_signed(ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                lock(&state).entries.insert(
                    key,
                    CacheEntry {
                        value: value.clone(),
                        expires_at,
                    },
                );
            }

            drop(guard);
            result
        }
        .boxed()
        .shared()
    }

    /// Fresh cached value, without fetching.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = lock(&self.state);
        state.prune(self.clock.now());
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Drop the cached value for `key`. An in-flight fetch is left alone.
    pub fn invalidate(&self, key: &K) {
        lock(&self.state).entries.remove(key);
    }

    /// Number of fresh entries.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let mut state = lock(&self.state);
        state.prune(self.clock.now());
        state.entries.len()
    }

    /// Number of keys with a fetch outstanding.
    #[cfg(test)]
    pub(crate) fn in_flight_len(&self) -> usize {
        lock(&self.state).in_flight.len()
    }
}
