//! Pending mutations awaiting the next flush.

use crate::domain::Notification;

/// Three deduplicated queues of pending mutations.
///
/// An id is never queued for both read and delete: a delete removes any
/// queued read or update for the same id, and later reads or updates of a
/// queued delete are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchQueue {
    mark_as_read: Vec<String>,
    delete: Vec<String>,
    update: Vec<Notification>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id was already covered.
    pub fn enqueue_mark_as_read(&mut self, notification_id: &str) -> bool {
        if self.is_deleting(notification_id) || self.mark_as_read.iter().any(|id| id == notification_id) {
            return false;
        }
        self.mark_as_read.push(notification_id.to_string());
        true
    }

    /// Queue a delete, superseding any queued read or update of the id.
    pub fn enqueue_delete(&mut self, notification_id: &str) -> bool {
        self.mark_as_read.retain(|id| id != notification_id);
        self.update.retain(|n| n.id != notification_id);

        if self.is_deleting(notification_id) {
            return false;
        }
        self.delete.push(notification_id.to_string());
        true
    }

    /// Queue a full replacement. A later update of the same id replaces the
    /// earlier one.
    pub fn enqueue_update(&mut self, notification: Notification) -> bool {
        if self.is_deleting(&notification.id) {
            return false;
        }
        match self.update.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => *existing = notification,
            None => self.update.push(notification),
        }
        true
    }

    pub fn mark_as_read(&self) -> &[String] {
        &self.mark_as_read
    }

    pub fn delete(&self) -> &[String] {
        &self.delete
    }

    pub fn update(&self) -> &[Notification] {
        &self.update
    }

    pub fn is_deleting(&self, notification_id: &str) -> bool {
        self.delete.iter().any(|id| id == notification_id)
    }

    pub fn len(&self) -> usize {
        self.mark_as_read.len() + self.delete.len() + self.update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain everything queued so far.
    pub fn take(&mut self) -> BatchQueue {
        std::mem::take(self)
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<String>, Vec<Notification>) {
        (self.mark_as_read, self.delete, self.update)
    }
}
