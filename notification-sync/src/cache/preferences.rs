//! Preference cache: one [`NotificationPreferences`] record per profile.

use std::time::Duration;

use tracing::debug;

use super::DEFAULT_TTL;
use super::ttl::{CacheStats, FetchTicket, InFlightRequest, InFlightResult, TtlMap};
use crate::domain::NotificationPreferences;

#[derive(Clone)]
pub struct PreferenceCache {
    map: TtlMap<NotificationPreferences>,
}

impl PreferenceCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            map: TtlMap::with_ttl(ttl),
        }
    }

    pub fn is_fresh(&self, profile_id: &str) -> bool {
        self.map.is_fresh(profile_id)
    }

    pub fn read(&self, profile_id: &str) -> Option<NotificationPreferences> {
        self.map.get_fresh(profile_id)
    }

    pub fn read_stale(&self, profile_id: &str) -> Option<NotificationPreferences> {
        self.map.get_any(profile_id)
    }

    /// Store the record and stamp it as freshly fetched.
    ///
    /// Also used after a confirmed update, since the merged value is what
    /// the host now holds.
    pub fn write(&self, preferences: NotificationPreferences) {
        debug!(profile_id = %preferences.profile_id, "Writing preference cache");
        self.map.insert(preferences.profile_id.clone(), preferences);
    }

    /// Optimistically replace the record without advancing its fetch stamp.
    ///
    /// Returns false when there was nothing cached to replace.
    pub fn replace(&self, preferences: NotificationPreferences) -> bool {
        let profile_id = preferences.profile_id.clone();
        self.map
            .patch(&profile_id, move |current| *current = preferences)
            .is_some()
    }

    pub fn invalidate(&self, profile_id: &str) {
        debug!(profile_id, "Invalidating preference cache");
        self.map.invalidate(profile_id);
    }

    pub fn begin_fetch(&self, profile_id: &str) -> FetchTicket<NotificationPreferences> {
        self.map.begin_fetch(profile_id)
    }

    pub async fn wait_for_fetch(
        &self,
        request: &InFlightRequest<NotificationPreferences>,
    ) -> InFlightResult<NotificationPreferences> {
        self.map.wait_for_fetch(request).await
    }

    pub fn cleanup_expired(&self) -> usize {
        self.map.cleanup_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.map.stats()
    }
}

impl Default for PreferenceCache {
    fn default() -> Self {
        Self::new()
    }
}
