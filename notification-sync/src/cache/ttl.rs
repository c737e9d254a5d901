//! Generic TTL map keyed by profile id.
//!
//! Backs both the notification list cache and the preference cache. Entries
//! carry the instant of their last full fetch; only [`TtlMap::insert`]
//! advances it. The map also tracks in-flight fetches so that concurrent
//! loads of the same profile share one host round trip.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Notify, OnceCell};
use tokio::time::Instant;

use crate::Error;

/// A cached value with the instant of its last full fetch.
#[derive(Clone)]
struct TtlEntry<V> {
    value: V,
    last_fetch: Instant,
}

impl<V> TtlEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            last_fetch: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.last_fetch.elapsed() < ttl
    }
}

/// Outcome shared with every caller waiting on the same fetch.
pub type InFlightResult<V> = std::result::Result<V, Error>;

pub struct InFlightState<V> {
    result: OnceCell<InFlightResult<V>>,
    notify: Notify,
}

impl<V: Clone> InFlightState<V> {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: InFlightResult<V>) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> InFlightResult<V> {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

pub type InFlightRequest<V> = Arc<InFlightState<V>>;

/// Role of a caller that asked to fetch a key.
pub enum FetchTicket<V: Clone> {
    /// This caller must perform the fetch and complete the request.
    Leader(FetchLeader<V>),
    /// Another fetch is already running; wait for its result.
    Follower(InFlightRequest<V>),
}

/// Obligation to complete an in-flight fetch.
///
/// Dropping it without calling [`FetchLeader::complete`] fails the request
/// so that followers are never left waiting.
pub struct FetchLeader<V: Clone> {
    map: TtlMap<V>,
    key: String,
    request: InFlightRequest<V>,
    completed: bool,
}

impl<V: Clone> FetchLeader<V> {
    pub fn complete(mut self, result: InFlightResult<V>) {
        self.completed = true;
        self.map.complete_fetch(&self.key, &self.request, result);
    }

    pub fn request(&self) -> &InFlightRequest<V> {
        &self.request
    }
}

impl<V: Clone> Drop for FetchLeader<V> {
    fn drop(&mut self) {
        if !self.completed {
            self.map.complete_fetch(
                &self.key,
                &self.request,
                Err(Error::Other(format!("fetch for {} abandoned", self.key))),
            );
        }
    }
}

/// Thread-safe TTL map with in-flight request deduplication.
pub struct TtlMap<V> {
    entries: Arc<DashMap<String, TtlEntry<V>>>,
    in_flight: Arc<DashMap<String, InFlightRequest<V>>>,
    ttl: Duration,
}

impl<V> Clone for TtlMap<V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            in_flight: self.in_flight.clone(),
            ttl: self.ttl,
        }
    }
}

impl<V: Clone> TtlMap<V> {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// True iff an entry exists and was fetched less than one TTL ago.
    pub fn is_fresh(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.is_fresh(self.ttl))
    }

    /// The value, if present and fresh.
    pub fn get_fresh(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        entry.is_fresh(self.ttl).then(|| entry.value.clone())
    }

    /// The value regardless of age.
    pub fn get_any(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn last_fetch(&self, key: &str) -> Option<Instant> {
        self.entries.get(key).map(|entry| entry.last_fetch)
    }

    /// Replace the entry and stamp it as freshly fetched.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), TtlEntry::new(value));
    }

    /// Mutate an existing entry in place without touching its fetch stamp.
    ///
    /// The closure runs under the shard lock, so readers see either the old
    /// or the new value. Returns the closure's result, or `None` when there is
    /// no entry.
    pub fn patch<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut entry = self.entries.get_mut(key)?;
        Some(f(&mut entry.value))
    }

    /// Drop the entry. A fetch already running for this key is detached so
    /// that its result is not written back.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
        self.in_flight.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
        self.in_flight.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all stale entries.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.is_fresh(ttl));
        before - self.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.len(),
            in_flight_count: self.in_flight.len(),
            ttl: self.ttl,
        }
    }

    // ========== Request Deduplication ==========

    /// Join the running fetch for `key`, or become the one that runs it.
    pub fn begin_fetch(&self, key: &str) -> FetchTicket<V> {
        if let Some(existing) = self.in_flight.get(key) {
            return FetchTicket::Follower(existing.clone());
        }

        match self.in_flight.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                FetchTicket::Follower(entry.get().clone())
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let request = Arc::new(InFlightState::new());
                entry.insert(request.clone());
                FetchTicket::Leader(FetchLeader {
                    map: self.clone(),
                    key: key.to_string(),
                    request,
                    completed: false,
                })
            }
        }
    }

    /// Publish the outcome of a fetch to its waiters.
    ///
    /// A successful value is written to the map only if the request is still
    /// the current one for `key`, i.e. it was not invalidated meanwhile.
    fn complete_fetch(&self, key: &str, request: &InFlightRequest<V>, result: InFlightResult<V>) {
        let is_current = self
            .in_flight
            .remove_if(key, |_, current| Arc::ptr_eq(current, request))
            .is_some();

        if is_current && let Ok(value) = &result {
            self.insert(key, value.clone());
        }
        request.set_result(result);
    }

    pub async fn wait_for_fetch(&self, request: &InFlightRequest<V>) -> InFlightResult<V> {
        request.wait().await
    }

    pub fn has_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }
}

/// Statistics about a TTL map.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entry_count: usize,
    pub in_flight_count: usize,
    pub ttl: Duration,
}
