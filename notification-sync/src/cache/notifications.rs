//! Notification list cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

use super::DEFAULT_TTL;
use super::ttl::{CacheStats, FetchTicket, InFlightRequest, InFlightResult, TtlMap};
use crate::domain::Notification;

/// Cached view of one profile's notifications, newest first.
///
/// `unread_count` is always the number of unread items in `notifications`:
/// it is derived from the list on construction and kept in step by every
/// patch. Decrements saturate at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub total_count: usize,
}

impl CacheEntry {
    pub fn new(notifications: Vec<Notification>) -> Self {
        let total_count = notifications.len();
        let unread_count = notifications.iter().filter(|n| !n.is_read()).count();
        Self {
            notifications,
            unread_count,
            total_count,
        }
    }

    pub fn contains(&self, notification_id: &str) -> bool {
        self.notifications.iter().any(|n| n.id == notification_id)
    }

    pub fn get(&self, notification_id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == notification_id)
    }

    /// Stamp `read_at` on the given ids. Returns how many were unread.
    pub fn mark_read(&mut self, ids: &[String], at: DateTime<Utc>) -> usize {
        let newly_read = self
            .notifications
            .iter_mut()
            .filter(|n| ids.contains(&n.id))
            .map(|n| n.mark_read(at))
            .filter(|changed| *changed)
            .count();
        self.unread_count = self.unread_count.saturating_sub(newly_read);
        newly_read
    }

    pub fn mark_all_read(&mut self, at: DateTime<Utc>) -> usize {
        let newly_read = self
            .notifications
            .iter_mut()
            .map(|n| n.mark_read(at))
            .filter(|changed| *changed)
            .count();
        self.unread_count = 0;
        newly_read
    }

    /// Remove the given ids. Returns how many were present.
    pub fn remove(&mut self, ids: &[String]) -> usize {
        let mut removed = 0;
        let mut removed_unread = 0;
        self.notifications.retain(|n| {
            if ids.contains(&n.id) {
                removed += 1;
                if !n.is_read() {
                    removed_unread += 1;
                }
                false
            } else {
                true
            }
        });
        self.total_count = self.total_count.saturating_sub(removed);
        self.unread_count = self.unread_count.saturating_sub(removed_unread);
        removed
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
        self.unread_count = 0;
        self.total_count = 0;
    }

    /// Insert at the front, or overwrite in place when the id is known.
    ///
    /// A read stamp already present locally is kept. Returns true when the
    /// notification was new.
    pub fn upsert(&mut self, mut notification: Notification) -> bool {
        if let Some(existing) = self
            .notifications
            .iter_mut()
            .find(|n| n.id == notification.id)
        {
            if notification.read_at.is_none() {
                notification.read_at = existing.read_at;
            }
            if !existing.is_read() && notification.is_read() {
                self.unread_count = self.unread_count.saturating_sub(1);
            }
            *existing = notification;
            return false;
        }

        if !notification.is_read() {
            self.unread_count += 1;
        }
        self.total_count += 1;
        self.notifications.insert(0, notification);
        true
    }

    /// Overwrite a known notification. Unknown ids are ignored.
    pub fn replace(&mut self, notification: Notification) -> bool {
        if !self.contains(&notification.id) {
            return false;
        }
        self.upsert(notification);
        true
    }

    /// Drop items whose expiry has passed. Returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .notifications
            .iter()
            .filter(|n| n.is_expired(now))
            .map(|n| n.id.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }
        self.remove(&expired)
    }
}

/// Per-profile, TTL-bounded notification list cache.
#[derive(Clone)]
pub struct NotificationCache {
    map: TtlMap<CacheEntry>,
}

impl NotificationCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            map: TtlMap::with_ttl(ttl),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.map.ttl()
    }

    pub fn is_fresh(&self, profile_id: &str) -> bool {
        self.map.is_fresh(profile_id)
    }

    /// The entry if fresh; `None` means the caller must fetch.
    pub fn read(&self, profile_id: &str) -> Option<CacheEntry> {
        self.map.get_fresh(profile_id)
    }

    /// The entry regardless of age, used as a fallback when a fetch fails.
    pub fn read_stale(&self, profile_id: &str) -> Option<CacheEntry> {
        self.map.get_any(profile_id)
    }

    pub fn last_fetch(&self, profile_id: &str) -> Option<Instant> {
        self.map.last_fetch(profile_id)
    }

    /// Replace the entry and stamp it as freshly fetched.
    ///
    /// `reported_unread` is the host's own count. The cached count is taken
    /// from the list; a disagreement is only logged.
    pub fn write(&self, profile_id: &str, notifications: Vec<Notification>, reported_unread: usize) {
        let entry = CacheEntry::new(notifications);
        if entry.unread_count != reported_unread {
            debug!(
                profile_id,
                reported_unread,
                listed_unread = entry.unread_count,
                "Host unread count disagrees with list"
            );
        }
        debug!(
            profile_id,
            count = entry.total_count,
            unread_count = entry.unread_count,
            "Writing notification cache"
        );
        self.map.insert(profile_id, entry);
    }

    pub fn invalidate(&self, profile_id: &str) {
        debug!(profile_id, "Invalidating notification cache");
        self.map.invalidate(profile_id);
    }

    /// Apply a transformation to the existing entry without advancing its
    /// fetch stamp. Returns `None` when there is no entry.
    pub fn patch<R>(&self, profile_id: &str, f: impl FnOnce(&mut CacheEntry) -> R) -> Option<R> {
        self.map.patch(profile_id, f)
    }

    pub fn prune_expired(&self, profile_id: &str, now: DateTime<Utc>) -> usize {
        self.patch(profile_id, |entry| entry.prune_expired(now))
            .unwrap_or(0)
    }

    pub fn begin_fetch(&self, profile_id: &str) -> FetchTicket<CacheEntry> {
        self.map.begin_fetch(profile_id)
    }

    pub async fn wait_for_fetch(
        &self,
        request: &InFlightRequest<CacheEntry>,
    ) -> InFlightResult<CacheEntry> {
        self.map.wait_for_fetch(request).await
    }

    pub fn cleanup_expired(&self) -> usize {
        self.map.cleanup_expired()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.map.stats()
    }
}

impl Default for NotificationCache {
    fn default() -> Self {
        Self::new()
    }
}
