//! Host wire schema and the field mapping to the internal model.
//!
//! The host exchanges flat, snake_cased records. Every field is optional at
//! the serde level so that a missing required field is reported by name
//! through [`MappingError`] instead of an opaque deserializer message.
//!
//! Mapping is lossless in both directions for canonical payloads:
//! timestamps are RFC 3339 in UTC with a `Z` suffix and enum values use the
//! host's variant names (`"System"`, `"Normal"`, ...).

mod mapper;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use mapper::{FieldMapper, format_timestamp, parse_timestamp};

/// Wire form of a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireNotification {
    pub id: Option<String>,
    pub profile_id: Option<String>,
    pub notification_type: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub priority: Option<String>,
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub metadata: Option<WireMetadata>,
}

impl WireNotification {
    /// Decode a raw payload, e.g. from the push channel.
    pub fn from_value(value: Value) -> Result<Self, crate::MappingError> {
        serde_json::from_value(value)
            .map_err(|e| crate::MappingError::invalid("Notification", "payload", e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Wire form of notification metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireMetadata {
    pub source: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Map<String, Value>>,
}

/// Wire form of a creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireCreateNotificationRequest {
    pub profile_id: Option<String>,
    pub notification_type: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WireMetadata>,
}

/// Wire form of a list filter. Every field is optional on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireNotificationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// Wire form of per-kind preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireTypePreference {
    pub enabled: Option<bool>,
    pub priority: Option<String>,
    pub show_toast: Option<bool>,
    pub play_sound: Option<bool>,
    pub persist_in_center: Option<bool>,
}

/// Wire form of quiet hours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireQuietHours {
    pub enabled: Option<bool>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub allow_urgent: Option<bool>,
}

/// Wire form of notification preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WirePreferences {
    pub profile_id: Option<String>,
    pub global_enabled: Option<bool>,
    pub sound_enabled: Option<bool>,
    pub desktop_enabled: Option<bool>,
    pub type_settings: Option<BTreeMap<String, WireTypePreference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<WireQuietHours>,
    pub max_notifications: Option<u32>,
    pub auto_delete_after_days: Option<u32>,
    pub updated_at: Option<String>,
}
