//! Internal notification model.
//!
//! These are the types the rest of the crate works with. They are nested
//! and strongly typed; the flat host representation lives in [`crate::wire`].

pub mod notification;
pub mod preferences;

pub use notification::{
    CreateNotificationRequest, Notification, NotificationContent, NotificationCounts,
    NotificationFilter, NotificationMetadata, NotificationPriority, NotificationType,
};
pub use preferences::{
    DeliverySettings, NotificationPreferences, PreferencesPatch, QuietHours, RetentionPolicy,
    TypePreference,
};
