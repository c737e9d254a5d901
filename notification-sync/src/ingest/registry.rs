//! Push subscription bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tracks every live push subscription.
///
/// Each [`register`](SubscriptionRegistry::register) call returns a
/// [`Subscription`] whose drop tears the listener down.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    active: DashMap<u64, ActiveSubscription>,
    shutdown: CancellationToken,
}

struct ActiveSubscription {
    profile_id: String,
    token: CancellationToken,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, profile_id: impl Into<String>) -> Subscription {
        let profile_id = profile_id.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let token = self.inner.shutdown.child_token();

        self.inner.active.insert(
            id,
            ActiveSubscription {
                profile_id: profile_id.clone(),
                token: token.clone(),
            },
        );
        debug!(subscription_id = id, profile_id = %profile_id, "Registered push subscription");

        Subscription {
            id,
            profile_id,
            token,
            registry: Arc::downgrade(&self.inner),
            task: None,
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    /// Profiles with at least one live subscription, sorted.
    pub fn active_profiles(&self) -> Vec<String> {
        let mut profiles: Vec<String> = self
            .inner
            .active
            .iter()
            .map(|entry| entry.profile_id.clone())
            .collect();
        profiles.sort();
        profiles.dedup();
        profiles
    }

    pub fn is_observed(&self, profile_id: &str) -> bool {
        self.inner
            .active
            .iter()
            .any(|entry| entry.profile_id == profile_id)
    }

    /// Cancel every subscription. Handles still held become inert.
    pub fn cancel_all(&self) {
        for entry in self.inner.active.iter() {
            entry.token.cancel();
        }
        self.inner.active.clear();
    }
}

/// Disposer for one push subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    profile_id: String,
    token: CancellationToken,
    registry: Weak<RegistryInner>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Token the listener task must watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Attach the listener task so that [`unsubscribe`](Self::unsubscribe)
    /// can wait for it.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.task = Some(task);
    }

    /// Cancel the listener and wait until it has stopped.
    pub async fn unsubscribe(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn cancel(&self) {
        self.token.cancel();
        if let Some(registry) = self.registry.upgrade()
            && registry.active.remove(&self.id).is_some()
        {
            debug!(subscription_id = self.id, profile_id = %self.profile_id, "Push subscription removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_unregisters() {
        let registry = SubscriptionRegistry::new();
        let first = registry.register("p1");
        let second = registry.register("p2");
        assert_eq!(registry.active_count(), 2);
        assert_eq!(registry.active_profiles(), ["p1", "p2"]);

        let token = first.token();
        drop(first);
        assert!(token.is_cancelled());
        assert_eq!(registry.active_count(), 1);
        assert!(!registry.is_observed("p1"));
        assert!(second.is_active());
    }

    #[test]
    fn test_cancel_all() {
        let registry = SubscriptionRegistry::new();
        let subscription = registry.register("p1");

        registry.cancel_all();
        assert!(!subscription.is_active());
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_waits_for_listener() {
        let registry = SubscriptionRegistry::new();
        let mut subscription = registry.register("p1");
        let token = subscription.token();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        subscription.attach(tokio::spawn(async move {
            token.cancelled().await;
            let _ = done_tx.send(());
        }));

        subscription.unsubscribe().await;
        assert!(done_rx.await.is_ok());
        assert_eq!(registry.active_count(), 0);
    }
}
