//! Observable state shared by the components of one observer.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::Error;

/// Loading flag, last recoverable error and push availability.
#[derive(Debug)]
pub struct SyncStatus {
    loading: AtomicUsize,
    error: RwLock<Option<Error>>,
    push_available: AtomicBool,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self {
            loading: AtomicUsize::new(0),
            error: RwLock::new(None),
            push_available: AtomicBool::new(true),
        }
    }

    /// True while at least one fetch is running.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    /// Mark a fetch as running until the guard is dropped.
    pub fn begin_loading(&self) -> LoadingGuard<'_> {
        self.loading.fetch_add(1, Ordering::SeqCst);
        LoadingGuard { status: self }
    }

    pub fn error(&self) -> Option<Error> {
        self.error.read().clone()
    }

    pub fn set_error(&self, error: Error) {
        debug!(error = %error, "Recording error state");
        *self.error.write() = Some(error);
    }

    pub fn clear_error(&self) {
        self.error.write().take();
    }

    pub fn push_available(&self) -> bool {
        self.push_available.load(Ordering::SeqCst)
    }

    pub fn set_push_available(&self, available: bool) {
        self.push_available.store(available, Ordering::SeqCst);
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LoadingGuard<'a> {
    status: &'a SyncStatus,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.status.loading.fetch_sub(1, Ordering::SeqCst);
    }
}
