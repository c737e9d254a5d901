//! Debounce timer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Runs a callback once a quiet period has elapsed since the last
/// [`schedule`](DebounceTimer::schedule) call.
///
/// Every `schedule` replaces the pending callback and restarts the delay.
/// Dropping the timer cancels whatever is pending.
pub struct DebounceTimer {
    shutdown: CancellationToken,
    state: Arc<Mutex<TimerState>>,
}

#[derive(Default)]
struct TimerState {
    generation: u64,
    pending: Option<PendingTimer>,
}

struct PendingTimer {
    generation: u64,
    token: CancellationToken,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    /// Run `f` after `delay`, cancelling any previously scheduled run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, delay: Duration, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.child_token();
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            let generation = state.generation;
            if let Some(previous) = state.pending.replace(PendingTimer {
                generation,
                token: token.clone(),
            }) {
                previous.token.cancel();
            }
            generation
        };

        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut state = state.lock();
                        match &state.pending {
                            Some(current) if current.generation == generation => {
                                state.pending = None;
                            }
                            _ => return,
                        }
                    }
                    f().await;
                }
            }
        });
    }

    /// Drop the pending run, if any.
    pub fn cancel(&self) -> bool {
        match self.state.lock().pending.take() {
            Some(pending) => {
                pending.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_callback(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_quiet_period() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = DebounceTimer::new();

        timer.schedule(Duration::from_millis(1000), counter_callback(&fired));
        tokio::time::sleep(Duration::from_millis(500)).await;
        timer.schedule(Duration::from_millis(1000), counter_callback(&fired));

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = DebounceTimer::new();

        timer.schedule(Duration::from_millis(100), counter_callback(&fired));
        assert!(timer.cancel());
        assert!(!timer.cancel());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_run() {
        let fired = Arc::new(AtomicUsize::new(0));
        let timer = DebounceTimer::new();

        timer.schedule(Duration::from_millis(100), counter_callback(&fired));
        drop(timer);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
