//! In-process host implementation.
//!
//! Keeps per-profile stores in memory and publishes push events the way
//! the native host does. Used by tests and for running the engine without
//! a host process. Supports fault injection: going offline, failing a given
//! command a number of times, and artificial latency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{HostBridge, commands};
use crate::config::{DEFAULT_EVENT_CHANNEL_CAPACITY, SyncConfig};
use crate::domain::{
    CreateNotificationRequest, Notification, NotificationFilter, NotificationPreferences,
};
use crate::wire::{
    FieldMapper, WireCreateNotificationRequest, WireNotification, WireNotificationFilter,
    WirePreferences,
};
use crate::{Error, Result};

/// In-memory stand-in for the native host.
pub struct InMemoryHost {
    notifications: RwLock<HashMap<String, Vec<Notification>>>,
    preferences: RwLock<HashMap<String, NotificationPreferences>>,
    calls: DashMap<&'static str, usize>,
    failures: Mutex<HashMap<&'static str, usize>>,
    offline: AtomicBool,
    push_available: AtomicBool,
    latency: Mutex<Option<Duration>>,
    event_tx: broadcast::Sender<Value>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Host sized by `config.event_channel_capacity`.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::with_capacity(config.event_channel_capacity)
    }

    /// Create a host whose push channel holds `capacity` undelivered events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self {
            notifications: RwLock::new(HashMap::new()),
            preferences: RwLock::new(HashMap::new()),
            calls: DashMap::new(),
            failures: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            push_available: AtomicBool::new(true),
            latency: Mutex::new(None),
            event_tx,
        }
    }

    // ========== Fixtures ==========

    /// Store notifications without announcing them.
    pub fn seed(&self, notifications: impl IntoIterator<Item = Notification>) {
        let mut store = self.notifications.write();
        for notification in notifications {
            store
                .entry(notification.profile_id.clone())
                .or_default()
                .push(notification);
        }
    }

    /// Store preferences for a profile.
    pub fn seed_preferences(&self, preferences: NotificationPreferences) {
        self.preferences
            .write()
            .insert(preferences.profile_id.clone(), preferences);
    }

    /// Store a notification created outside this client and announce it.
    pub fn push(&self, notification: Notification) -> usize {
        let payload = notification.to_wire().to_value();
        self.seed([notification]);
        self.emit(payload)
    }

    /// Publish a raw payload on the push channel without storing anything.
    ///
    /// Returns the number of subscribers that received it.
    pub fn emit(&self, payload: Value) -> usize {
        self.event_tx.send(payload).unwrap_or(0)
    }

    /// Snapshot of what the host currently stores for a profile.
    pub fn stored(&self, profile_id: &str) -> Vec<Notification> {
        self.notifications
            .read()
            .get(profile_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored_preferences(&self, profile_id: &str) -> Option<NotificationPreferences> {
        self.preferences.read().get(profile_id).cloned()
    }

    // ========== Fault injection ==========

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `times` invocations of `command` fail.
    pub fn fail_next(&self, command: &'static str, times: usize) {
        self.failures.lock().insert(command, times);
    }

    pub fn set_push_available(&self, available: bool) {
        self.push_available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of times `command` has been invoked.
    pub fn calls(&self, command: &str) -> usize {
        self.calls.get(command).map(|c| *c).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    async fn enter(&self, command: &'static str) -> Result<()> {
        *self.calls.entry(command).or_default() += 1;

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::host(command, "host unavailable"));
        }

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(command)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::host(command, "injected failure"));
        }

        Ok(())
    }

    fn not_found(command: &'static str, notification_id: &str, profile_id: &str) -> Error {
        Error::host(
            command,
            format!("notification {notification_id} not found for profile {profile_id}"),
        )
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostBridge for InMemoryHost {
    async fn get_notifications(
        &self,
        profile_id: &str,
        filter: &WireNotificationFilter,
    ) -> Result<Vec<WireNotification>> {
        self.enter(commands::GET_NOTIFICATIONS).await?;
        let filter = NotificationFilter::from_wire(filter.clone())
            .map_err(|e| Error::host(commands::GET_NOTIFICATIONS, e.to_string()))?;

        let mut matching: Vec<Notification> = self
            .stored(profile_id)
            .into_iter()
            .filter(|n| filter.matches(n))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);

        Ok(matching
            .iter()
            .skip(offset)
            .take(limit)
            .map(Notification::to_wire)
            .collect())
    }

    async fn get_unread_notifications_count(&self, profile_id: &str) -> Result<u32> {
        self.enter(commands::GET_UNREAD_COUNT).await?;
        let unread = self
            .stored(profile_id)
            .iter()
            .filter(|n| !n.is_read())
            .count();
        Ok(unread as u32)
    }

    async fn get_notification_preferences(&self, profile_id: &str) -> Result<WirePreferences> {
        self.enter(commands::GET_PREFERENCES).await?;
        let preferences = self
            .stored_preferences(profile_id)
            .unwrap_or_else(|| NotificationPreferences::defaults_for(profile_id, Utc::now()));
        Ok(preferences.to_wire())
    }

    async fn update_notification_preferences(&self, preferences: &WirePreferences) -> Result<()> {
        self.enter(commands::UPDATE_PREFERENCES).await?;
        let preferences = NotificationPreferences::from_wire(preferences.clone())
            .map_err(|e| Error::host(commands::UPDATE_PREFERENCES, e.to_string()))?;
        self.seed_preferences(preferences);
        Ok(())
    }

    async fn mark_notification_as_read(&self, profile_id: &str, notification_id: &str) -> Result<()> {
        self.enter(commands::MARK_AS_READ).await?;
        let now = Utc::now();
        let mut store = self.notifications.write();
        let notification = store
            .get_mut(profile_id)
            .and_then(|list| list.iter_mut().find(|n| n.id == notification_id))
            .ok_or_else(|| Self::not_found(commands::MARK_AS_READ, notification_id, profile_id))?;
        notification.mark_read(now);
        Ok(())
    }

    async fn mark_multiple_notifications_as_read(
        &self,
        profile_id: &str,
        notification_ids: &[String],
    ) -> Result<()> {
        self.enter(commands::MARK_MULTIPLE_AS_READ).await?;
        let now = Utc::now();
        let mut store = self.notifications.write();
        let marked = store
            .get_mut(profile_id)
            .map(|list| {
                list.iter_mut()
                    .filter(|n| notification_ids.contains(&n.id))
                    .map(|n| n.mark_read(now))
                    .filter(|changed| *changed)
                    .count()
            })
            .unwrap_or(0);
        debug!(profile_id, marked, "Marked notifications as read");
        Ok(())
    }

    async fn mark_all_notifications_as_read(&self, profile_id: &str) -> Result<()> {
        self.enter(commands::MARK_ALL_AS_READ).await?;
        let now = Utc::now();
        if let Some(list) = self.notifications.write().get_mut(profile_id) {
            for notification in list.iter_mut() {
                notification.mark_read(now);
            }
        }
        Ok(())
    }

    async fn delete_notification(&self, notification_id: &str, profile_id: &str) -> Result<()> {
        self.enter(commands::DELETE).await?;
        let mut store = self.notifications.write();
        let list = store
            .get_mut(profile_id)
            .ok_or_else(|| Self::not_found(commands::DELETE, notification_id, profile_id))?;
        let before = list.len();
        list.retain(|n| n.id != notification_id);
        if list.len() == before {
            return Err(Self::not_found(commands::DELETE, notification_id, profile_id));
        }
        Ok(())
    }

    async fn clear_all_notifications(&self, profile_id: &str) -> Result<()> {
        self.enter(commands::CLEAR_ALL).await?;
        self.notifications.write().remove(profile_id);
        Ok(())
    }

    async fn create_notification(
        &self,
        request: &WireCreateNotificationRequest,
    ) -> Result<WireNotification> {
        self.enter(commands::CREATE).await?;
        let now = Utc::now();
        let request = CreateNotificationRequest::from_wire(request.clone())
            .map_err(|e| Error::host(commands::CREATE, e.to_string()))?;
        request
            .validate(now)
            .map_err(|e| Error::host(commands::CREATE, e.to_string()))?;

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            profile_id: request.profile_id,
            kind: request.kind,
            content: request.content,
            priority: request.priority.unwrap_or_default(),
            created_at: now,
            read_at: None,
            expires_at: request.expires_at,
            metadata: request.metadata.unwrap_or_default(),
        };

        let wire = notification.to_wire();
        self.push(notification);
        Ok(wire)
    }

    fn subscribe_created(&self) -> Result<broadcast::Receiver<Value>> {
        if !self.push_available.load(Ordering::SeqCst) {
            return Err(Error::Subscription(format!(
                "{} channel unavailable",
                super::NOTIFICATION_CREATED_EVENT
            )));
        }
        Ok(self.event_tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NotificationContent, NotificationMetadata, NotificationPriority, NotificationType};
    use chrono::Duration as ChronoDuration;

    fn notification(id: &str, profile_id: &str, minutes_ago: i64) -> Notification {
        Notification {
            id: id.to_string(),
            profile_id: profile_id.to_string(),
            kind: NotificationType::System,
            content: NotificationContent::new(id, "body"),
            priority: NotificationPriority::Normal,
            created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
            read_at: None,
            expires_at: None,
            metadata: NotificationMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paged() {
        let host = InMemoryHost::new();
        host.seed([
            notification("old", "p1", 30),
            notification("new", "p1", 1),
            notification("mid", "p1", 10),
            notification("other", "p2", 0),
        ]);

        let all = host
            .get_notifications("p1", &WireNotificationFilter::default())
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.clone().unwrap()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);

        let page = host
            .get_notifications(
                "p1",
                &NotificationFilter::default().with_window(1, 1).to_wire(),
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id.as_deref(), Some("mid"));
    }

    #[tokio::test]
    async fn test_ownership_is_enforced() {
        let host = InMemoryHost::new();
        host.seed([notification("n1", "p1", 0)]);

        assert!(host.mark_notification_as_read("p2", "n1").await.is_err());
        assert!(host.delete_notification("n1", "p2").await.is_err());
        assert!(host.mark_notification_as_read("p1", "n1").await.is_ok());
        assert_eq!(host.get_unread_notifications_count("p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let host = InMemoryHost::new();
        host.fail_next(commands::GET_UNREAD_COUNT, 1);

        let err = host.get_unread_notifications_count("p1").await.unwrap_err();
        assert!(matches!(err, Error::Host { .. }));
        assert!(host.get_unread_notifications_count("p1").await.is_ok());

        host.set_offline(true);
        assert!(host.clear_all_notifications("p1").await.is_err());
        assert_eq!(host.calls(commands::GET_UNREAD_COUNT), 2);
        assert_eq!(host.calls(commands::CLEAR_ALL), 1);

        host.set_push_available(false);
        assert!(matches!(host.subscribe_created(), Err(Error::Subscription(_))));
    }

    #[tokio::test]
    async fn test_channel_capacity_comes_from_config() {
        let config = SyncConfig {
            event_channel_capacity: 2,
            ..SyncConfig::default()
        };
        let host = InMemoryHost::from_config(&config);
        let mut rx = host.subscribe_created().unwrap();

        for i in 0..5 {
            host.emit(serde_json::json!({ "seq": i }));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }

    #[tokio::test]
    async fn test_create_publishes_event() {
        let host = InMemoryHost::new();
        let mut rx = host.subscribe_created().unwrap();

        let request = CreateNotificationRequest::new("p1", NotificationType::Update, "Update", "v2 is out");
        let created = host.create_notification(&request.to_wire()).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event["id"], serde_json::json!(created.id.clone().unwrap()));
        assert_eq!(event["notification_type"], "Update");
        assert_eq!(host.stored("p1").len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_create_is_rejected() {
        let host = InMemoryHost::new();
        let request = CreateNotificationRequest::new("p1", NotificationType::Update, "", "body");
        assert!(host.create_notification(&request.to_wire()).await.is_err());
        assert!(host.stored("p1").is_empty());
    }
}
