//! Mutation batcher.
//!
//! With batching enabled, mutations are applied to the cache right away and
//! queued; a single debounced flush sends them to the host. Without
//! batching, every mutation is its own host call and the cache only changes
//! once the host has confirmed it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::queue::BatchQueue;
use super::scheduler::DebounceTimer;
use crate::bridge::HostBridge;
use crate::cache::NotificationCache;
use crate::config::SyncConfig;
use crate::domain::Notification;
use crate::status::SyncStatus;
use crate::{Error, Result};

/// What a flush sent to the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub marked_read: usize,
    pub deleted: usize,
    pub updated: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.marked_read == 0 && self.deleted == 0 && self.updated == 0
    }
}

/// Coalesces read/delete/update requests for one profile.
#[derive(Clone)]
pub struct MutationBatcher {
    inner: Arc<BatcherInner>,
}

struct BatcherInner {
    profile_id: String,
    bridge: Arc<dyn HostBridge>,
    cache: NotificationCache,
    status: Arc<SyncStatus>,
    queue: Mutex<BatchQueue>,
    /// Held for the whole of a flush so that flushes never overlap.
    flushing: tokio::sync::Mutex<()>,
    timer: DebounceTimer,
    debounce_window: Duration,
    batching_enabled: bool,
    flush_count: AtomicUsize,
}

impl MutationBatcher {
    pub fn new(
        profile_id: impl Into<String>,
        bridge: Arc<dyn HostBridge>,
        cache: NotificationCache,
        status: Arc<SyncStatus>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                profile_id: profile_id.into(),
                bridge,
                cache,
                status,
                queue: Mutex::new(BatchQueue::new()),
                flushing: tokio::sync::Mutex::new(()),
                timer: DebounceTimer::new(),
                debounce_window: config.debounce_window(),
                batching_enabled: config.batching_enabled,
                flush_count: AtomicUsize::new(0),
            }),
        }
    }

    pub fn profile_id(&self) -> &str {
        &self.inner.profile_id
    }

    pub fn is_batching(&self) -> bool {
        self.inner.batching_enabled
    }

    // ========== Mode-dependent operations ==========

    /// Mark one notification read.
    ///
    /// Returns as soon as the id is queued when batching, otherwise once the
    /// host has confirmed.
    pub async fn mark_as_read(&self, notification_id: &str) -> Result<()> {
        if self.is_batching() {
            self.enqueue_mark_as_read(notification_id);
            return Ok(());
        }

        let inner = &self.inner;
        let result = inner
            .bridge
            .mark_notification_as_read(&inner.profile_id, notification_id)
            .await;
        inner.settle_immediate(result, |entry, now| {
            entry.mark_read(&[notification_id.to_string()], now);
        })
    }

    pub async fn mark_multiple_as_read(&self, notification_ids: &[String]) -> Result<()> {
        if notification_ids.is_empty() {
            return Ok(());
        }
        if self.is_batching() {
            for id in notification_ids {
                self.enqueue_mark_as_read(id);
            }
            return Ok(());
        }

        let inner = &self.inner;
        let result = inner
            .bridge
            .mark_multiple_notifications_as_read(&inner.profile_id, notification_ids)
            .await;
        inner.settle_immediate(result, |entry, now| {
            entry.mark_read(notification_ids, now);
        })
    }

    pub async fn delete(&self, notification_id: &str) -> Result<()> {
        if self.is_batching() {
            self.enqueue_delete(notification_id);
            return Ok(());
        }

        let inner = &self.inner;
        let result = inner
            .bridge
            .delete_notification(notification_id, &inner.profile_id)
            .await;
        inner.settle_immediate(result, |entry, _| {
            entry.remove(&[notification_id.to_string()]);
        })
    }

    /// Replace a cached notification.
    ///
    /// The host has no update command, so this only ever changes local state.
    pub async fn update(&self, notification: Notification) -> Result<()> {
        if self.is_batching() {
            self.enqueue_update(notification);
            return Ok(());
        }
        self.inner
            .cache
            .patch(&self.inner.profile_id, |entry| entry.replace(notification));
        Ok(())
    }

    // ========== Queueing ==========

    /// Queue a read, stamp it in the cache and restart the debounce window.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue_mark_as_read(&self, notification_id: &str) {
        let inner = &self.inner;
        if inner.queue.lock().enqueue_mark_as_read(notification_id) {
            let now = Utc::now();
            inner.cache.patch(&inner.profile_id, |entry| {
                entry.mark_read(&[notification_id.to_string()], now)
            });
        }
        inner.schedule_flush();
    }

    /// Queue a delete and drop the id from the cache.
    pub fn enqueue_delete(&self, notification_id: &str) {
        let inner = &self.inner;
        if inner.queue.lock().enqueue_delete(notification_id) {
            inner.cache.patch(&inner.profile_id, |entry| {
                entry.remove(&[notification_id.to_string()])
            });
        }
        inner.schedule_flush();
    }

    pub fn enqueue_update(&self, notification: Notification) {
        let inner = &self.inner;
        if inner.queue.lock().enqueue_update(notification.clone()) {
            inner
                .cache
                .patch(&inner.profile_id, |entry| entry.replace(notification));
        }
        inner.schedule_flush();
    }

    /// Snapshot of what the next flush would send.
    pub fn pending(&self) -> BatchQueue {
        self.inner.queue.lock().clone()
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.queue.lock().is_empty()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.timer.is_pending()
    }

    /// Number of non-empty flushes issued so far.
    pub fn flush_count(&self) -> usize {
        self.inner.flush_count.load(Ordering::SeqCst)
    }

    /// Flush now instead of waiting for the debounce window.
    ///
    /// A flush already talking to the host is waited for, so on return every
    /// mutation queued before the call has been confirmed or has failed.
    pub async fn flush(&self) -> Result<FlushReport> {
        self.inner.timer.cancel();
        self.inner.flush().await
    }

    /// Stop the debounce timer and discard queued mutations.
    ///
    /// Discarded mutations were already applied to the cache, so the cache is
    /// invalidated to let the next read restore host state.
    pub fn cancel(&self) -> usize {
        let inner = &self.inner;
        inner.timer.cancel();
        let discarded = inner.queue.lock().take();
        if !discarded.is_empty() {
            info!(
                profile_id = %inner.profile_id,
                discarded = discarded.len(),
                "Discarding unflushed mutations"
            );
            inner.cache.invalidate(&inner.profile_id);
        }
        discarded.len()
    }

    /// Drop queued mutations that host state already supersedes, e.g. after
    /// the whole list was cleared. The cache is left as is.
    pub fn clear_pending(&self) -> usize {
        self.inner.timer.cancel();
        self.inner.queue.lock().take().len()
    }
}

impl BatcherInner {
    fn schedule_flush(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.timer.schedule(self.debounce_window, move || async move {
            if let Some(inner) = weak.upgrade()
                && let Err(e) = inner.flush().await
            {
                debug!(error = %e, "Debounced flush failed");
            }
        });
    }

    fn settle_immediate(
        &self,
        result: Result<()>,
        apply: impl FnOnce(&mut crate::cache::CacheEntry, chrono::DateTime<Utc>),
    ) -> Result<()> {
        match result {
            Ok(()) => {
                let now = Utc::now();
                self.cache.patch(&self.profile_id, |entry| apply(entry, now));
                Ok(())
            }
            Err(e) => {
                warn!(profile_id = %self.profile_id, error = %e, "Mutation failed");
                self.status.set_error(e.clone());
                Err(e)
            }
        }
    }

    async fn flush(&self) -> Result<FlushReport> {
        let _flushing = self.flushing.lock().await;
        let batch = self.queue.lock().take();
        if batch.is_empty() {
            return Ok(FlushReport::default());
        }

        self.flush_count.fetch_add(1, Ordering::SeqCst);
        let (reads, deletes, updates) = batch.into_parts();
        debug!(
            profile_id = %self.profile_id,
            reads = reads.len(),
            deletes = deletes.len(),
            updates = updates.len(),
            "Flushing mutation batch"
        );

        let read_call = async {
            if reads.is_empty() {
                return Ok(());
            }
            self.bridge
                .mark_multiple_notifications_as_read(&self.profile_id, &reads)
                .await
        };
        let delete_calls = join_all(deletes.iter().map(|id| async move {
            let result = self.bridge.delete_notification(id, &self.profile_id).await;
            (id, result)
        }));
        let (read_result, delete_results) = tokio::join!(read_call, delete_calls);

        let mut failed = Vec::new();
        let mut messages = Vec::new();
        if let Err(e) = read_result {
            failed.extend(reads.iter().cloned());
            messages.push(e.to_string());
        }
        for (id, result) in delete_results {
            if let Err(e) = result {
                failed.push(id.clone());
                messages.push(e.to_string());
            }
        }

        if !failed.is_empty() {
            self.cache.invalidate(&self.profile_id);
            let error = Error::BatchFlush {
                profile_id: self.profile_id.clone(),
                failed,
                message: messages.join("; "),
            };
            warn!(profile_id = %self.profile_id, error = %error, "Batch flush failed");
            self.status.set_error(error.clone());
            return Err(error);
        }

        let report = FlushReport {
            marked_read: reads.len(),
            deleted: deletes.len(),
            updated: updates.len(),
        };
        let now = Utc::now();
        self.cache.patch(&self.profile_id, move |entry| {
            entry.mark_read(&reads, now);
            entry.remove(&deletes);
            for notification in updates {
                entry.replace(notification);
            }
        });
        debug!(profile_id = %self.profile_id, ?report, "Batch flushed");
        Ok(report)
    }
}
