//! Merges push events into the notification cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::registry::{Subscription, SubscriptionRegistry};
use crate::Result;
use crate::cache::NotificationCache;
use crate::domain::Notification;
use crate::status::SyncStatus;
use crate::wire::{FieldMapper, WireNotification};

/// What happened to one push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New id, prepended to the cached list.
    Inserted,
    /// Known id, overwritten in place.
    Replaced,
    /// Owned by a profile this ingestor does not observe.
    OtherProfile,
    /// Nothing cached for the profile yet; the next fetch will include it.
    NotCached,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    inserted: AtomicU64,
    replaced: AtomicU64,
    discarded: AtomicU64,
    malformed: AtomicU64,
}

/// Snapshot of ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub inserted: u64,
    pub replaced: u64,
    pub discarded: u64,
    pub malformed: u64,
}

/// Applies `notification-created` events for one observed profile.
#[derive(Clone)]
pub struct EventIngestor {
    profile_id: String,
    cache: NotificationCache,
    counters: Arc<Counters>,
}

impl EventIngestor {
    pub fn new(profile_id: impl Into<String>, cache: NotificationCache) -> Self {
        Self {
            profile_id: profile_id.into(),
            cache,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Map a raw payload and merge it.
    ///
    /// A malformed payload is an [`Error::Mapping`](crate::Error::Mapping)
    /// and leaves the cache untouched.
    pub fn ingest(&self, payload: Value) -> Result<IngestOutcome> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let notification = WireNotification::from_value(payload)
            .and_then(Notification::from_wire)
            .inspect_err(|_| {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
            })?;
        Ok(self.merge(notification))
    }

    /// Merge an already mapped notification.
    pub fn ingest_notification(&self, notification: Notification) -> IngestOutcome {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        self.merge(notification)
    }

    fn merge(&self, notification: Notification) -> IngestOutcome {
        if !notification.belongs_to(&self.profile_id) {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return IngestOutcome::OtherProfile;
        }

        let notification_id = notification.id.clone();
        let outcome = match self
            .cache
            .patch(&self.profile_id, |entry| entry.upsert(notification))
        {
            Some(true) => {
                self.counters.inserted.fetch_add(1, Ordering::Relaxed);
                IngestOutcome::Inserted
            }
            Some(false) => {
                self.counters.replaced.fetch_add(1, Ordering::Relaxed);
                IngestOutcome::Replaced
            }
            None => IngestOutcome::NotCached,
        };
        trace!(profile_id = %self.profile_id, notification_id = %notification_id, ?outcome, "Push event merged");
        outcome
    }

    pub fn stats(&self) -> IngestStats {
        let c = &self.counters;
        IngestStats {
            received: c.received.load(Ordering::Relaxed),
            inserted: c.inserted.load(Ordering::Relaxed),
            replaced: c.replaced.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
        }
    }

    /// Listen on `receiver` until the returned subscription is dropped.
    ///
    /// Events are applied in delivery order. Malformed payloads are recorded
    /// in `status`; a lagging receiver invalidates the profile's cache since
    /// events were lost.
    pub fn spawn(
        self,
        mut receiver: broadcast::Receiver<Value>,
        registry: &SubscriptionRegistry,
        status: Arc<SyncStatus>,
    ) -> Subscription {
        let mut subscription = registry.register(self.profile_id.clone());
        let token = subscription.token();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(profile_id = %self.profile_id, "Push listener shutting down");
                        break;
                    }
                    result = receiver.recv() => {
                        match result {
                            Ok(payload) => {
                                if let Err(e) = self.ingest(payload) {
                                    warn!(profile_id = %self.profile_id, error = %e, "Malformed push event");
                                    status.set_error(e);
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(profile_id = %self.profile_id, "Push listener lagged by {} events", n);
                                self.cache.invalidate(&self.profile_id);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!(profile_id = %self.profile_id, "Push channel closed");
                                status.set_push_available(false);
                                break;
                            }
                        }
                    }
                }
            }
        });

        subscription.attach(task);
        subscription
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bridge::{HostBridge, InMemoryHost};
    use crate::domain::{
        NotificationContent, NotificationMetadata, NotificationPriority, NotificationType,
    };
    use chrono::Utc;

    fn notification(id: &str, profile_id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            profile_id: profile_id.to_string(),
            kind: NotificationType::Security,
            content: NotificationContent::new("New login", "A new device signed in"),
            priority: NotificationPriority::High,
            created_at: Utc::now(),
            read_at: None,
            expires_at: None,
            metadata: NotificationMetadata::default(),
        }
    }

    fn observed_cache() -> NotificationCache {
        let cache = NotificationCache::new();
        cache.write("p1", vec![notification("n1", "p1")], 1);
        cache
    }

    #[test]
    fn test_event_for_other_profile_is_ignored() {
        let cache = observed_cache();
        let ingestor = EventIngestor::new("p1", cache.clone());

        let payload = notification("x1", "p2").to_wire().to_value();
        assert_eq!(ingestor.ingest(payload).unwrap(), IngestOutcome::OtherProfile);

        assert!(cache.read_stale("p2").is_none());
        assert_eq!(cache.read_stale("p1").unwrap().total_count, 1);
        assert_eq!(ingestor.stats().discarded, 1);
    }

    #[test]
    fn test_replayed_event_is_applied_once() {
        let cache = observed_cache();
        let ingestor = EventIngestor::new("p1", cache.clone());
        let payload = notification("n2", "p1").to_wire().to_value();

        assert_eq!(ingestor.ingest(payload.clone()).unwrap(), IngestOutcome::Inserted);
        assert_eq!(ingestor.ingest(payload).unwrap(), IngestOutcome::Replaced);

        let entry = cache.read_stale("p1").unwrap();
        assert_eq!(entry.notifications.iter().filter(|n| n.id == "n2").count(), 1);
        assert_eq!(entry.notifications[0].id, "n2");
        assert_eq!((entry.unread_count, entry.total_count), (2, 2));
    }

    #[test]
    fn test_read_arrival_does_not_bump_unread() {
        let cache = observed_cache();
        let ingestor = EventIngestor::new("p1", cache.clone());
        let mut already_read = notification("n2", "p1");
        already_read.read_at = Some(Utc::now());

        ingestor.ingest_notification(already_read);
        let entry = cache.read_stale("p1").unwrap();
        assert_eq!((entry.unread_count, entry.total_count), (1, 2));
    }

    #[test]
    fn test_uncached_profile_is_left_alone() {
        let cache = NotificationCache::new();
        let ingestor = EventIngestor::new("p1", cache.clone());

        assert_eq!(
            ingestor.ingest_notification(notification("n1", "p1")),
            IngestOutcome::NotCached
        );
        assert!(cache.read_stale("p1").is_none());
    }

    #[test]
    fn test_malformed_payload_names_field() {
        let cache = observed_cache();
        let ingestor = EventIngestor::new("p1", cache.clone());

        let mut payload = notification("n2", "p1").to_wire().to_value();
        payload.as_object_mut().unwrap().remove("profile_id");

        let err = ingestor.ingest(payload).unwrap_err();
        assert!(err.is_contract_violation());
        assert!(err.to_string().contains("profile_id"));
        assert_eq!(cache.read_stale("p1").unwrap().total_count, 1);
        assert_eq!(ingestor.stats().malformed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_stops_after_unsubscribe() {
        let host = InMemoryHost::new();
        let cache = observed_cache();
        let registry = SubscriptionRegistry::new();
        let status = Arc::new(SyncStatus::new());

        let subscription = EventIngestor::new("p1", cache.clone()).spawn(
            host.subscribe_created().unwrap(),
            &registry,
            status.clone(),
        );
        assert_eq!(host.subscriber_count(), 1);

        host.push(notification("n2", "p1"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(cache.read_stale("p1").unwrap().contains("n2"));

        subscription.unsubscribe().await;
        assert_eq!(host.subscriber_count(), 0);
        assert_eq!(registry.active_count(), 0);

        host.push(notification("n3", "p1"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!cache.read_stale("p1").unwrap().contains("n3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_listener_invalidates_cache() {
        let host = InMemoryHost::with_capacity(2);
        let cache = observed_cache();
        let registry = SubscriptionRegistry::new();
        let status = Arc::new(SyncStatus::new());

        let _subscription = EventIngestor::new("p1", cache.clone()).spawn(
            host.subscribe_created().unwrap(),
            &registry,
            status,
        );

        for i in 0..5 {
            host.push(notification(&format!("burst{i}"), "p1"));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(cache.read_stale("p1").is_none());
    }
}
