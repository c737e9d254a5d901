//! The surface consumed by the UI.
//!
//! A [`NotificationCenter`] observes one profile. It reads through the shared
//! caches, routes mutations through a [`MutationBatcher`], keeps a push
//! listener alive for as long as it is open, and optionally refreshes on an
//! interval.
//!
//! Recoverable failures never escape: they are recorded in the status and
//! exposed through [`NotificationCenter::error`] until
//! [`clear_error`](NotificationCenter::clear_error) or a successful
//! [`refresh`](NotificationCenter::refresh). Only mapping errors are
//! returned to the caller.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::batch::{BatchQueue, MutationBatcher};
use crate::bridge::HostBridge;
use crate::cache::{CacheEntry, FetchTicket, NotificationCaches};
use crate::config::SyncConfig;
use crate::domain::{
    CreateNotificationRequest, Notification, NotificationCounts, NotificationFilter,
    NotificationPreferences, NotificationType, PreferencesPatch,
};
use crate::ingest::{EventIngestor, IngestStats, Subscription, SubscriptionRegistry};
use crate::loader::{Page, PaginatedLoader};
use crate::status::SyncStatus;
use crate::wire::FieldMapper;
use crate::{Error, MappingError, Result};

pub struct NotificationCenter {
    profile_id: String,
    bridge: Arc<dyn HostBridge>,
    caches: NotificationCaches,
    config: SyncConfig,
    status: Arc<SyncStatus>,
    batcher: MutationBatcher,
    loader: PaginatedLoader,
    ingestor: EventIngestor,
    registry: SubscriptionRegistry,
    subscription: Mutex<Option<Subscription>>,
    shutdown: CancellationToken,
}

impl NotificationCenter {
    /// Start observing `profile_id`.
    ///
    /// Subscribes to push events and starts the auto-refresh task when
    /// configured. A push channel that cannot be established only disables
    /// live updates. Must be called from within a tokio runtime.
    pub fn open(
        profile_id: impl Into<String>,
        bridge: Arc<dyn HostBridge>,
        caches: NotificationCaches,
        config: SyncConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let profile_id = profile_id.into();
        if profile_id.trim().is_empty() {
            return Err(Error::validation("profile id is empty"));
        }

        let status = Arc::new(SyncStatus::new());
        let batcher = MutationBatcher::new(
            profile_id.clone(),
            bridge.clone(),
            caches.notifications.clone(),
            status.clone(),
            &config,
        );
        let loader = PaginatedLoader::new(bridge.clone(), config.page_size);
        let ingestor = EventIngestor::new(profile_id.clone(), caches.notifications.clone());
        let registry = SubscriptionRegistry::new();

        let subscription = match bridge.subscribe_created() {
            Ok(receiver) => Some(ingestor.clone().spawn(receiver, &registry, status.clone())),
            Err(e) => {
                warn!(profile_id = %profile_id, error = %e, "Push channel unavailable, relying on refresh");
                status.set_push_available(false);
                None
            }
        };

        let center = Arc::new(Self {
            profile_id,
            bridge,
            caches,
            config,
            status,
            batcher,
            loader,
            ingestor,
            registry,
            subscription: Mutex::new(subscription),
            shutdown: CancellationToken::new(),
        });

        if let Some(period) = center.config.auto_refresh_interval() {
            Self::spawn_auto_refresh(Arc::downgrade(&center), center.shutdown.child_token(), period);
        }

        info!(
            profile_id = %center.profile_id,
            batching = center.config.batching_enabled,
            push = center.status.push_available(),
            "Notification center opened"
        );
        Ok(center)
    }

    fn spawn_auto_refresh(center: Weak<Self>, token: CancellationToken, period: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(center) = center.upgrade() else { break };
                        if let Err(e) = center.refresh().await {
                            warn!(profile_id = %center.profile_id, error = %e, "Auto refresh failed");
                        }
                    }
                }
            }
            debug!("Auto refresh stopped");
        });
    }

    // ========== State ==========

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Cached list, newest first. Expired items are pruned on read.
    pub fn notifications(&self) -> Vec<Notification> {
        self.entry().map(|e| e.notifications).unwrap_or_default()
    }

    pub fn unread_count(&self) -> usize {
        self.entry().map(|e| e.unread_count).unwrap_or_default()
    }

    pub fn total_count(&self) -> usize {
        self.entry().map(|e| e.total_count).unwrap_or_default()
    }

    /// Counts by type and priority derived from the cached list.
    pub fn counts(&self) -> NotificationCounts {
        NotificationCounts::from_list(&self.notifications())
    }

    pub fn is_fresh(&self) -> bool {
        self.caches.notifications.is_fresh(&self.profile_id)
    }

    pub fn is_loading(&self) -> bool {
        self.status.is_loading()
    }

    pub fn error(&self) -> Option<Error> {
        self.status.error()
    }

    pub fn clear_error(&self) {
        self.status.clear_error();
    }

    /// False when live updates are unavailable and only refreshes apply.
    pub fn push_available(&self) -> bool {
        self.status.push_available()
    }

    pub fn pending_mutations(&self) -> BatchQueue {
        self.batcher.pending()
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.ingestor.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn entry(&self) -> Option<CacheEntry> {
        let cache = &self.caches.notifications;
        cache.prune_expired(&self.profile_id, Utc::now());
        cache.read_stale(&self.profile_id)
    }

    // ========== Loading ==========

    /// Fetch unless the cached list is still fresh.
    pub async fn load(&self) -> Result<()> {
        if self.is_fresh() {
            return Ok(());
        }
        match self.fetch().await {
            Ok(()) => Ok(()),
            Err(e) => self.absorb(e),
        }
    }

    /// Fetch regardless of freshness. Success clears the error state.
    ///
    /// Joins a fetch that is already running for the profile instead of
    /// racing it.
    pub async fn refresh(&self) -> Result<()> {
        match self.fetch().await {
            Ok(()) => {
                self.status.clear_error();
                Ok(())
            }
            Err(e) => self.absorb(e),
        }
    }

    async fn fetch(&self) -> Result<()> {
        let _loading = self.status.begin_loading();
        let cache = &self.caches.notifications;

        match cache.begin_fetch(&self.profile_id) {
            FetchTicket::Leader(leader) => {
                let result = self.fetch_entry().await;
                let outcome = result.as_ref().map(|_| ()).map_err(Error::clone);
                leader.complete(result);
                outcome
            }
            FetchTicket::Follower(request) => {
                debug!(profile_id = %self.profile_id, "Joining in-flight fetch");
                cache.wait_for_fetch(&request).await.map(|_| ())
            }
        }
    }

    async fn fetch_entry(&self) -> Result<CacheEntry> {
        let filter = NotificationFilter::default().to_wire();
        let (wire, unread) = tokio::try_join!(
            self.bridge.get_notifications(&self.profile_id, &filter),
            self.bridge.get_unread_notifications_count(&self.profile_id),
        )
        .map_err(Error::into_fetch)?;

        let mut notifications = wire
            .into_iter()
            .map(Notification::from_wire)
            .collect::<std::result::Result<Vec<_>, MappingError>>()?;

        let received = notifications.len();
        notifications.retain(|n| n.belongs_to(&self.profile_id));
        if notifications.len() != received {
            warn!(
                profile_id = %self.profile_id,
                discarded = received - notifications.len(),
                "Host returned notifications owned by another profile"
            );
        }
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let entry = CacheEntry::new(notifications);
        if entry.unread_count != unread as usize {
            debug!(
                profile_id = %self.profile_id,
                reported_unread = unread,
                listed_unread = entry.unread_count,
                "Host unread count disagrees with list"
            );
        }
        debug!(
            profile_id = %self.profile_id,
            count = entry.total_count,
            unread = entry.unread_count,
            "Fetched notifications"
        );
        Ok(entry)
    }

    /// Load a window straight from the host, bypassing the cache.
    ///
    /// Returns `None` when the host call failed; the error is recorded.
    pub async fn load_page(
        &self,
        offset: u32,
        limit: u32,
        filter: Option<&NotificationFilter>,
    ) -> Result<Option<Page>> {
        match self.loader.load_page(&self.profile_id, offset, limit, filter).await {
            Ok(page) => Ok(Some(page)),
            Err(e) => self.absorb(e).map(|()| None),
        }
    }

    /// First window of the configured page size.
    pub async fn load_first_page(&self, filter: Option<&NotificationFilter>) -> Result<Option<Page>> {
        match self.loader.load_first(&self.profile_id, filter).await {
            Ok(page) => Ok(Some(page)),
            Err(e) => self.absorb(e).map(|()| None),
        }
    }

    /// Window following `page`, with the same limit.
    pub async fn load_next_page(
        &self,
        page: &Page,
        filter: Option<&NotificationFilter>,
    ) -> Result<Option<Page>> {
        match self.loader.load_next(&self.profile_id, page, filter).await {
            Ok(page) => Ok(Some(page)),
            Err(e) => self.absorb(e).map(|()| None),
        }
    }

    // ========== Mutations ==========

    pub async fn mark_as_read(&self, notification_id: &str) -> Result<()> {
        if self.reject_if_closed() {
            return Ok(());
        }
        let result = self.batcher.mark_as_read(notification_id).await;
        self.settle(result)
    }

    pub async fn mark_multiple_as_read(&self, notification_ids: &[String]) -> Result<()> {
        if self.reject_if_closed() {
            return Ok(());
        }
        let result = self.batcher.mark_multiple_as_read(notification_ids).await;
        self.settle(result)
    }

    pub async fn delete(&self, notification_id: &str) -> Result<()> {
        if self.reject_if_closed() {
            return Ok(());
        }
        let result = self.batcher.delete(notification_id).await;
        self.settle(result)
    }

    /// Replace a cached notification locally.
    pub async fn update_notification(&self, notification: Notification) -> Result<()> {
        if self.reject_if_closed() {
            return Ok(());
        }
        if !notification.belongs_to(&self.profile_id) {
            return self.absorb(Error::validation(format!(
                "notification {} is not owned by profile {}",
                notification.id, self.profile_id
            )));
        }
        let result = self.batcher.update(notification).await;
        self.settle(result)
    }

    /// Issued immediately, never batched.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        if self.reject_if_closed() {
            return Ok(());
        }
        match self
            .bridge
            .mark_all_notifications_as_read(&self.profile_id)
            .await
        {
            Ok(()) => {
                let now = Utc::now();
                self.caches
                    .notifications
                    .patch(&self.profile_id, |entry| entry.mark_all_read(now));
                Ok(())
            }
            Err(e) => self.absorb(e),
        }
    }

    /// Issued immediately, never batched. Queued mutations are dropped.
    pub async fn clear_all(&self) -> Result<()> {
        if self.reject_if_closed() {
            return Ok(());
        }
        match self.bridge.clear_all_notifications(&self.profile_id).await {
            Ok(()) => {
                let dropped = self.batcher.clear_pending();
                if dropped > 0 {
                    debug!(profile_id = %self.profile_id, dropped, "Dropped queued mutations after clear");
                }
                self.caches
                    .notifications
                    .patch(&self.profile_id, |entry| entry.clear());
                Ok(())
            }
            Err(e) => self.absorb(e),
        }
    }

    /// Validate, create on the host and merge the result into the cache.
    ///
    /// Returns `None` when validation or the host call failed.
    pub async fn create(&self, request: CreateNotificationRequest) -> Result<Option<Notification>> {
        if self.reject_if_closed() {
            return Ok(None);
        }
        if let Err(e) = request.validate(Utc::now()) {
            return self.absorb(e).map(|()| None);
        }

        let wire = match self.bridge.create_notification(&request.to_wire()).await {
            Ok(wire) => wire,
            Err(e) => return self.absorb(e).map(|()| None),
        };
        let created = match Notification::from_wire(wire) {
            Ok(created) => created,
            Err(e) => return self.absorb(e.into()).map(|()| None),
        };

        self.caches
            .notifications
            .patch(&created.profile_id, |entry| entry.upsert(created.clone()));
        debug!(profile_id = %created.profile_id, notification_id = %created.id, "Notification created");
        Ok(Some(created))
    }

    /// Send queued mutations now.
    pub async fn flush(&self) -> Result<()> {
        let result = self.batcher.flush().await;
        self.settle(result)
    }

    // ========== Preferences ==========

    /// Cached preferences, fetched when missing or stale.
    ///
    /// On fetch failure the stale record is returned when there is one.
    pub async fn preferences(&self) -> Result<Option<NotificationPreferences>> {
        let cache = &self.caches.preferences;
        if let Some(preferences) = cache.read(&self.profile_id) {
            return Ok(Some(preferences));
        }

        let _loading = self.status.begin_loading();
        let result = match cache.begin_fetch(&self.profile_id) {
            FetchTicket::Leader(leader) => {
                let result = self.fetch_preferences().await;
                leader.complete(result.clone());
                result
            }
            FetchTicket::Follower(request) => cache.wait_for_fetch(&request).await,
        };

        match result {
            Ok(preferences) => Ok(Some(preferences)),
            Err(e) => {
                self.absorb(e)?;
                Ok(cache.read_stale(&self.profile_id))
            }
        }
    }

    async fn fetch_preferences(&self) -> Result<NotificationPreferences> {
        let wire = self
            .bridge
            .get_notification_preferences(&self.profile_id)
            .await
            .map_err(Error::into_fetch)?;
        Ok(NotificationPreferences::from_wire(wire)?)
    }

    /// Merge `patch` into the current record and persist it.
    ///
    /// The cache holds the merged record as soon as it is sent. On success
    /// it stays there as fresh; on failure the cache is invalidated and
    /// `None` is returned.
    pub async fn update_preferences(
        &self,
        patch: PreferencesPatch,
    ) -> Result<Option<NotificationPreferences>> {
        if self.reject_if_closed() {
            return Ok(None);
        }
        let Some(current) = self.preferences().await? else {
            return Ok(None);
        };

        let merged = patch.merge(&current, Utc::now());
        let cache = &self.caches.preferences;
        cache.replace(merged.clone());

        match self
            .bridge
            .update_notification_preferences(&merged.to_wire())
            .await
        {
            Ok(()) => {
                cache.write(merged.clone());
                Ok(Some(merged))
            }
            Err(e) => {
                cache.invalidate(&self.profile_id);
                self.absorb(e).map(|()| None)
            }
        }
    }

    /// Enable or disable one notification type, keeping its other settings.
    pub async fn toggle_type(
        &self,
        kind: NotificationType,
        enabled: bool,
    ) -> Result<Option<NotificationPreferences>> {
        let Some(current) = self.preferences().await? else {
            return Ok(None);
        };

        let mut preference = current.type_preference(&kind);
        preference.enabled = enabled;
        let mut patch = PreferencesPatch::default();
        patch.type_settings.insert(kind, preference);
        self.update_preferences(patch).await
    }

    // ========== Lifecycle ==========

    /// Stop observing: cancel the debounce timer, unsubscribe from push
    /// events and stop auto refresh. Idempotent.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();

        let discarded = self.batcher.cancel();
        self.subscription.lock().take();
        self.registry.cancel_all();

        info!(profile_id = %self.profile_id, discarded, "Notification center closed");
    }

    /// Number of live push subscriptions held by this center.
    pub fn subscription_count(&self) -> usize {
        self.registry.active_count()
    }

    // ========== Error policy ==========

    /// Records an error and returns true once the center is closed.
    fn reject_if_closed(&self) -> bool {
        if !self.is_closed() {
            return false;
        }
        self.status.set_error(Error::Other(format!(
            "notification center for {} is closed",
            self.profile_id
        )));
        true
    }

    fn settle<T>(&self, result: Result<T>) -> Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(e) => self.absorb(e),
        }
    }

    /// Record a failure. Only contract violations are handed back.
    fn absorb(&self, error: Error) -> Result<()> {
        if error.is_contract_violation() {
            warn!(profile_id = %self.profile_id, error = %error, "Host contract violation");
            self.status.set_error(error.clone());
            return Err(error);
        }
        debug!(profile_id = %self.profile_id, error = %error, "Recoverable failure");
        self.status.set_error(error);
        Ok(())
    }
}

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        self.close();
    }
}
