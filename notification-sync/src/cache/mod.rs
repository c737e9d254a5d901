//! Per-profile caches.
//!
//! Both caches share [`TtlMap`]: entries are replaced wholesale by a fetch,
//! patched in place by optimistic mutations and push events, and dropped by
//! invalidation.

pub mod notifications;
pub mod preferences;
pub mod ttl;

use std::time::Duration;

pub use notifications::{CacheEntry, NotificationCache};
pub use preferences::PreferenceCache;
pub use ttl::{CacheStats, FetchLeader, FetchTicket, InFlightRequest, InFlightResult, TtlMap};

use crate::config::DEFAULT_CACHE_TTL_MS;

/// Default TTL for cached lists and preferences (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_millis(DEFAULT_CACHE_TTL_MS);

/// Caches shared by every observer in the process.
#[derive(Clone)]
pub struct NotificationCaches {
    pub notifications: NotificationCache,
    pub preferences: PreferenceCache,
}

impl NotificationCaches {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            notifications: NotificationCache::with_ttl(ttl),
            preferences: PreferenceCache::with_ttl(ttl),
        }
    }
}

impl Default for NotificationCaches {
    fn default() -> Self {
        Self::new()
    }
}
