//! Contract with the native host process.
//!
//! The host owns persistence, retention and ownership checks. This crate
//! only sees the request/response commands below plus a single push
//! channel announcing newly created notifications.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::Result;
use crate::wire::{
    WireCreateNotificationRequest, WireNotification, WireNotificationFilter, WirePreferences,
};

pub use memory::InMemoryHost;

/// Name of the push event carrying a newly created notification.
pub const NOTIFICATION_CREATED_EVENT: &str = "notification-created";

/// Host command names, used for logging and error reporting.
pub mod commands {
    pub const GET_NOTIFICATIONS: &str = "get_notifications";
    pub const GET_UNREAD_COUNT: &str = "get_unread_notifications_count";
    pub const GET_PREFERENCES: &str = "get_notification_preferences";
    pub const UPDATE_PREFERENCES: &str = "update_notification_preferences";
    pub const MARK_AS_READ: &str = "mark_notification_as_read";
    pub const MARK_MULTIPLE_AS_READ: &str = "mark_multiple_notifications_as_read";
    pub const MARK_ALL_AS_READ: &str = "mark_all_notifications_as_read";
    pub const DELETE: &str = "delete_notification";
    pub const CLEAR_ALL: &str = "clear_all_notifications";
    pub const CREATE: &str = "create_notification";
}

/// Request/response bridge into the host.
///
/// Failures are reported as [`crate::Error::Host`] naming the command.
#[async_trait]
pub trait HostBridge: Send + Sync {
    async fn get_notifications(
        &self,
        profile_id: &str,
        filter: &WireNotificationFilter,
    ) -> Result<Vec<WireNotification>>;

    async fn get_unread_notifications_count(&self, profile_id: &str) -> Result<u32>;

    async fn get_notification_preferences(&self, profile_id: &str) -> Result<WirePreferences>;

    async fn update_notification_preferences(&self, preferences: &WirePreferences) -> Result<()>;

    async fn mark_notification_as_read(&self, profile_id: &str, notification_id: &str) -> Result<()>;

    async fn mark_multiple_notifications_as_read(
        &self,
        profile_id: &str,
        notification_ids: &[String],
    ) -> Result<()>;

    async fn mark_all_notifications_as_read(&self, profile_id: &str) -> Result<()>;

    async fn delete_notification(&self, notification_id: &str, profile_id: &str) -> Result<()>;

    async fn clear_all_notifications(&self, profile_id: &str) -> Result<()>;

    async fn create_notification(
        &self,
        request: &WireCreateNotificationRequest,
    ) -> Result<WireNotification>;

    /// Subscribe to [`NOTIFICATION_CREATED_EVENT`].
    ///
    /// Every subscriber receives every event regardless of profile; payloads
    /// are raw wire records.
    fn subscribe_created(&self) -> Result<broadcast::Receiver<Value>>;
}
