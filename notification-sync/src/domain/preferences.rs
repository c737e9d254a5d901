//! Per-profile notification preferences.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::notification::{NotificationPriority, NotificationType};

/// Channel toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySettings {
    pub global_enabled: bool,
    pub sound_enabled: bool,
    pub desktop_enabled: bool,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            global_enabled: true,
            sound_enabled: true,
            desktop_enabled: true,
        }
    }
}

/// Settings for a single notification kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypePreference {
    pub enabled: bool,
    /// Minimum priority that is surfaced for this kind.
    pub priority: NotificationPriority,
    pub show_toast: bool,
    pub play_sound: bool,
    pub persist_in_center: bool,
}

impl Default for TypePreference {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: NotificationPriority::Normal,
            show_toast: true,
            play_sound: false,
            persist_in_center: true,
        }
    }
}

/// Quiet hours window, times in `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuietHours {
    pub enabled: bool,
    pub start_time: String,
    pub end_time: String,
    pub allow_urgent: bool,
}

/// Retention limits. Enforced by the host; mirrored here for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub max_notifications: u32,
    pub auto_delete_after_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_notifications: 50,
            auto_delete_after_days: 30,
        }
    }
}

/// Notification preferences of one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub profile_id: String,
    pub delivery: DeliverySettings,
    /// Unknown kinds are kept but never consulted.
    pub type_settings: BTreeMap<NotificationType, TypePreference>,
    pub quiet_hours: Option<QuietHours>,
    pub retention: RetentionPolicy,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    /// Host defaults for a profile.
    pub fn defaults_for(profile_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let type_settings = NotificationType::KNOWN
            .iter()
            .map(|kind| (kind.clone(), default_type_preference(kind)))
            .collect();

        Self {
            profile_id: profile_id.into(),
            delivery: DeliverySettings::default(),
            type_settings,
            quiet_hours: None,
            retention: RetentionPolicy::default(),
            updated_at: now,
        }
    }

    /// Settings for a known kind. Falls back to the generic default.
    pub fn type_preference(&self, kind: &NotificationType) -> TypePreference {
        if !kind.is_known() {
            return TypePreference::default();
        }
        self.type_settings.get(kind).cloned().unwrap_or_default()
    }

    /// Whether notifications of this kind and priority should surface at all.
    pub fn allows(&self, kind: &NotificationType, priority: NotificationPriority) -> bool {
        if !self.delivery.global_enabled {
            return false;
        }
        let pref = self.type_preference(kind);
        pref.enabled && priority >= pref.priority
    }
}

fn default_type_preference(kind: &NotificationType) -> TypePreference {
    let (priority, show_toast, play_sound) = match kind {
        NotificationType::System => (NotificationPriority::Normal, true, true),
        NotificationType::Security => (NotificationPriority::High, true, true),
        NotificationType::Game | NotificationType::Store => (NotificationPriority::Low, false, false),
        _ => (NotificationPriority::Normal, true, false),
    };
    TypePreference {
        enabled: true,
        priority,
        show_toast,
        play_sound,
        persist_in_center: true,
    }
}

/// Partial update of [`NotificationPreferences`].
///
/// Every `None` leaves the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub global_enabled: Option<bool>,
    pub sound_enabled: Option<bool>,
    pub desktop_enabled: Option<bool>,
    /// Entries replace the matching kinds; other kinds are kept.
    pub type_settings: BTreeMap<NotificationType, TypePreference>,
    /// `Some(None)` clears quiet hours.
    pub quiet_hours: Option<Option<QuietHours>>,
    pub max_notifications: Option<u32>,
    pub auto_delete_after_days: Option<u32>,
}

impl PreferencesPatch {
    pub fn sound_enabled(enabled: bool) -> Self {
        Self {
            sound_enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `{...current, ...patch}`, stamped with `now`.
    pub fn merge(&self, current: &NotificationPreferences, now: DateTime<Utc>) -> NotificationPreferences {
        let mut merged = current.clone();

        if let Some(v) = self.global_enabled {
            merged.delivery.global_enabled = v;
        }
        if let Some(v) = self.sound_enabled {
            merged.delivery.sound_enabled = v;
        }
        if let Some(v) = self.desktop_enabled {
            merged.delivery.desktop_enabled = v;
        }
        for (kind, pref) in &self.type_settings {
            merged.type_settings.insert(kind.clone(), pref.clone());
        }
        if let Some(quiet_hours) = &self.quiet_hours {
            merged.quiet_hours = quiet_hours.clone();
        }
        if let Some(v) = self.max_notifications {
            merged.retention.max_notifications = v;
        }
        if let Some(v) = self.auto_delete_after_days {
            merged.retention.auto_delete_after_days = v;
        }

        merged.updated_at = now;
        merged
    }
}
