//! Bidirectional translation between wire records and model types.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use super::{
    WireCreateNotificationRequest, WireMetadata, WireNotification, WireNotificationFilter,
    WirePreferences, WireQuietHours, WireTypePreference,
};
use crate::MappingError;
use crate::domain::{
    CreateNotificationRequest, DeliverySettings, Notification, NotificationContent,
    NotificationFilter, NotificationMetadata, NotificationPreferences, NotificationPriority,
    NotificationType, QuietHours, RetentionPolicy, TypePreference,
};

/// Pure conversion between a model type and its wire record.
///
/// `from_wire(to_wire(x)) == x` holds for every model value, and
/// `to_wire(from_wire(w)) == w` for every canonical wire record.
pub trait FieldMapper: Sized {
    type Wire;

    fn to_wire(&self) -> Self::Wire;

    fn from_wire(wire: Self::Wire) -> Result<Self, MappingError>;
}

/// Canonical wire timestamp format.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a wire timestamp. Any RFC 3339 offset is accepted and normalised to UTC.
pub fn parse_timestamp(
    entity: &'static str,
    field: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, MappingError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| MappingError::invalid(entity, field, format!("{raw:?}: {e}")))
}

fn required<T>(value: Option<T>, entity: &'static str, field: &'static str) -> Result<T, MappingError> {
    value.ok_or(MappingError::missing(entity, field))
}

fn optional_timestamp(
    value: Option<String>,
    entity: &'static str,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, MappingError> {
    value
        .map(|raw| parse_timestamp(entity, field, &raw))
        .transpose()
}

fn parse_priority(
    raw: &str,
    entity: &'static str,
    field: &'static str,
) -> Result<NotificationPriority, MappingError> {
    NotificationPriority::parse(raw)
        .ok_or_else(|| MappingError::invalid(entity, field, format!("unknown priority {raw:?}")))
}

const NOTIFICATION: &str = "Notification";
const CREATE_REQUEST: &str = "CreateNotificationRequest";
const FILTER: &str = "NotificationFilter";
const PREFERENCES: &str = "NotificationPreferences";

fn metadata_to_wire(metadata: &NotificationMetadata) -> WireMetadata {
    WireMetadata {
        source: Some(metadata.source.clone()),
        category: Some(metadata.category.clone()),
        tags: Some(metadata.tags.clone()),
        custom_data: metadata.custom_data.clone(),
    }
}

fn metadata_from_wire(
    wire: WireMetadata,
    entity: &'static str,
) -> Result<NotificationMetadata, MappingError> {
    Ok(NotificationMetadata {
        source: required(wire.source, entity, "metadata.source")?,
        category: required(wire.category, entity, "metadata.category")?,
        tags: required(wire.tags, entity, "metadata.tags")?,
        custom_data: wire.custom_data,
    })
}

impl FieldMapper for Notification {
    type Wire = WireNotification;

    fn to_wire(&self) -> WireNotification {
        WireNotification {
            id: Some(self.id.clone()),
            profile_id: Some(self.profile_id.clone()),
            notification_type: Some(self.kind.wire_name().to_string()),
            title: Some(self.content.title.clone()),
            message: Some(self.content.message.clone()),
            icon: self.content.icon.clone(),
            action_url: self.content.action_url.clone(),
            priority: Some(self.priority.wire_name().to_string()),
            created_at: Some(format_timestamp(&self.created_at)),
            read_at: self.read_at.as_ref().map(format_timestamp),
            expires_at: self.expires_at.as_ref().map(format_timestamp),
            metadata: Some(metadata_to_wire(&self.metadata)),
        }
    }

    fn from_wire(wire: WireNotification) -> Result<Self, MappingError> {
        let kind = required(wire.notification_type, NOTIFICATION, "notification_type")?;
        let priority = required(wire.priority, NOTIFICATION, "priority")?;
        let created_at = required(wire.created_at, NOTIFICATION, "created_at")?;

        Ok(Self {
            id: required(wire.id, NOTIFICATION, "id")?,
            profile_id: required(wire.profile_id, NOTIFICATION, "profile_id")?,
            kind: NotificationType::parse(&kind),
            content: NotificationContent {
                title: required(wire.title, NOTIFICATION, "title")?,
                message: required(wire.message, NOTIFICATION, "message")?,
                icon: wire.icon,
                action_url: wire.action_url,
            },
            priority: parse_priority(&priority, NOTIFICATION, "priority")?,
            created_at: parse_timestamp(NOTIFICATION, "created_at", &created_at)?,
            read_at: optional_timestamp(wire.read_at, NOTIFICATION, "read_at")?,
            expires_at: optional_timestamp(wire.expires_at, NOTIFICATION, "expires_at")?,
            metadata: metadata_from_wire(
                required(wire.metadata, NOTIFICATION, "metadata")?,
                NOTIFICATION,
            )?,
        })
    }
}

impl FieldMapper for CreateNotificationRequest {
    type Wire = WireCreateNotificationRequest;

    fn to_wire(&self) -> WireCreateNotificationRequest {
        WireCreateNotificationRequest {
            profile_id: Some(self.profile_id.clone()),
            notification_type: Some(self.kind.wire_name().to_string()),
            title: Some(self.content.title.clone()),
            message: Some(self.content.message.clone()),
            icon: self.content.icon.clone(),
            action_url: self.content.action_url.clone(),
            priority: self.priority.map(|p| p.wire_name().to_string()),
            expires_at: self.expires_at.as_ref().map(format_timestamp),
            metadata: self.metadata.as_ref().map(metadata_to_wire),
        }
    }

    fn from_wire(wire: WireCreateNotificationRequest) -> Result<Self, MappingError> {
        let kind = required(wire.notification_type, CREATE_REQUEST, "notification_type")?;

        Ok(Self {
            profile_id: required(wire.profile_id, CREATE_REQUEST, "profile_id")?,
            kind: NotificationType::parse(&kind),
            content: NotificationContent {
                title: required(wire.title, CREATE_REQUEST, "title")?,
                message: required(wire.message, CREATE_REQUEST, "message")?,
                icon: wire.icon,
                action_url: wire.action_url,
            },
            priority: wire
                .priority
                .map(|raw| parse_priority(&raw, CREATE_REQUEST, "priority"))
                .transpose()?,
            expires_at: optional_timestamp(wire.expires_at, CREATE_REQUEST, "expires_at")?,
            metadata: wire
                .metadata
                .map(|m| metadata_from_wire(m, CREATE_REQUEST))
                .transpose()?,
        })
    }
}

impl FieldMapper for NotificationFilter {
    type Wire = WireNotificationFilter;

    fn to_wire(&self) -> WireNotificationFilter {
        WireNotificationFilter {
            notification_type: self.kind.as_ref().map(|k| k.wire_name().to_string()),
            priority: self.priority.map(|p| p.wire_name().to_string()),
            unread_only: self.unread_only,
            category: self.category.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }

    fn from_wire(wire: WireNotificationFilter) -> Result<Self, MappingError> {
        Ok(Self {
            kind: wire.notification_type.as_deref().map(NotificationType::parse),
            priority: wire
                .priority
                .map(|raw| parse_priority(&raw, FILTER, "priority"))
                .transpose()?,
            unread_only: wire.unread_only,
            category: wire.category,
            limit: wire.limit,
            offset: wire.offset,
        })
    }
}

impl FieldMapper for TypePreference {
    type Wire = WireTypePreference;

    fn to_wire(&self) -> WireTypePreference {
        WireTypePreference {
            enabled: Some(self.enabled),
            priority: Some(self.priority.wire_name().to_string()),
            show_toast: Some(self.show_toast),
            play_sound: Some(self.play_sound),
            persist_in_center: Some(self.persist_in_center),
        }
    }

    fn from_wire(wire: WireTypePreference) -> Result<Self, MappingError> {
        let priority = required(wire.priority, PREFERENCES, "type_settings.priority")?;
        Ok(Self {
            enabled: required(wire.enabled, PREFERENCES, "type_settings.enabled")?,
            priority: parse_priority(&priority, PREFERENCES, "type_settings.priority")?,
            show_toast: required(wire.show_toast, PREFERENCES, "type_settings.show_toast")?,
            play_sound: required(wire.play_sound, PREFERENCES, "type_settings.play_sound")?,
            persist_in_center: required(
                wire.persist_in_center,
                PREFERENCES,
                "type_settings.persist_in_center",
            )?,
        })
    }
}

impl FieldMapper for QuietHours {
    type Wire = WireQuietHours;

    fn to_wire(&self) -> WireQuietHours {
        WireQuietHours {
            enabled: Some(self.enabled),
            start_time: Some(self.start_time.clone()),
            end_time: Some(self.end_time.clone()),
            allow_urgent: Some(self.allow_urgent),
        }
    }

    fn from_wire(wire: WireQuietHours) -> Result<Self, MappingError> {
        Ok(Self {
            enabled: required(wire.enabled, PREFERENCES, "quiet_hours.enabled")?,
            start_time: required(wire.start_time, PREFERENCES, "quiet_hours.start_time")?,
            end_time: required(wire.end_time, PREFERENCES, "quiet_hours.end_time")?,
            allow_urgent: required(wire.allow_urgent, PREFERENCES, "quiet_hours.allow_urgent")?,
        })
    }
}

impl FieldMapper for NotificationPreferences {
    type Wire = WirePreferences;

    fn to_wire(&self) -> WirePreferences {
        WirePreferences {
            profile_id: Some(self.profile_id.clone()),
            global_enabled: Some(self.delivery.global_enabled),
            sound_enabled: Some(self.delivery.sound_enabled),
            desktop_enabled: Some(self.delivery.desktop_enabled),
            type_settings: Some(
                self.type_settings
                    .iter()
                    .map(|(kind, pref)| (kind.wire_name().to_string(), pref.to_wire()))
                    .collect(),
            ),
            quiet_hours: self.quiet_hours.as_ref().map(QuietHours::to_wire),
            max_notifications: Some(self.retention.max_notifications),
            auto_delete_after_days: Some(self.retention.auto_delete_after_days),
            updated_at: Some(format_timestamp(&self.updated_at)),
        }
    }

    fn from_wire(wire: WirePreferences) -> Result<Self, MappingError> {
        let type_settings: BTreeMap<NotificationType, TypePreference> =
            required(wire.type_settings, PREFERENCES, "type_settings")?
                .into_iter()
                .map(|(kind, pref)| {
                    Ok((NotificationType::parse(&kind), TypePreference::from_wire(pref)?))
                })
                .collect::<Result<_, MappingError>>()?;
        let updated_at = required(wire.updated_at, PREFERENCES, "updated_at")?;

        Ok(Self {
            profile_id: required(wire.profile_id, PREFERENCES, "profile_id")?,
            delivery: DeliverySettings {
                global_enabled: required(wire.global_enabled, PREFERENCES, "global_enabled")?,
                sound_enabled: required(wire.sound_enabled, PREFERENCES, "sound_enabled")?,
                desktop_enabled: required(wire.desktop_enabled, PREFERENCES, "desktop_enabled")?,
            },
            type_settings,
            quiet_hours: wire.quiet_hours.map(QuietHours::from_wire).transpose()?,
            retention: RetentionPolicy {
                max_notifications: required(
                    wire.max_notifications,
                    PREFERENCES,
                    "max_notifications",
                )?,
                auto_delete_after_days: required(
                    wire.auto_delete_after_days,
                    PREFERENCES,
                    "auto_delete_after_days",
                )?,
            },
            updated_at: parse_timestamp(PREFERENCES, "updated_at", &updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_wire() -> serde_json::Value {
        json!({
            "id": "n1",
            "profile_id": "p1",
            "notification_type": "Security",
            "title": "New login",
            "message": "A new device signed in",
            "action_url": "app://security",
            "priority": "High",
            "created_at": "2024-05-01T10:00:00Z",
            "read_at": "2024-05-01T10:05:30.250Z",
            "metadata": {
                "source": "auth",
                "category": "login",
                "tags": ["device"],
                "custom_data": { "ip": "10.0.0.1" }
            }
        })
    }

    #[test]
    fn test_from_wire_nests_fields() {
        let wire = WireNotification::from_value(sample_wire()).unwrap();
        let n = Notification::from_wire(wire).unwrap();

        assert_eq!(n.kind, NotificationType::Security);
        assert_eq!(n.priority, NotificationPriority::High);
        assert_eq!(n.content.title, "New login");
        assert_eq!(n.content.action_url.as_deref(), Some("app://security"));
        assert!(n.content.icon.is_none());
        assert!(n.expires_at.is_none());
        assert_eq!(
            n.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(n.metadata.custom_data.unwrap()["ip"], "10.0.0.1");
    }

    #[test]
    fn test_canonical_wire_round_trips() {
        let wire = WireNotification::from_value(sample_wire()).unwrap();
        let back = Notification::from_wire(wire.clone()).unwrap().to_wire();
        assert_eq!(back, wire);
        assert_eq!(back.to_value(), sample_wire());
    }

    #[test]
    fn test_absent_optionals_stay_absent() {
        let mut value = sample_wire();
        value.as_object_mut().unwrap().remove("action_url");
        let n = Notification::from_wire(WireNotification::from_value(value).unwrap()).unwrap();
        assert!(n.content.action_url.is_none());

        let wire = n.to_wire().to_value();
        assert!(wire.get("action_url").is_none());
        assert!(wire.get("icon").is_none());
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let mut value = sample_wire();
        value.as_object_mut().unwrap().remove("profile_id");
        let err = Notification::from_wire(WireNotification::from_value(value).unwrap()).unwrap_err();
        assert_eq!(err, MappingError::missing("Notification", "profile_id"));

        let mut value = sample_wire();
        value["metadata"].as_object_mut().unwrap().remove("tags");
        let err = Notification::from_wire(WireNotification::from_value(value).unwrap()).unwrap_err();
        assert_eq!(err.field(), "metadata.tags");
    }

    #[test]
    fn test_invalid_values_are_not_coerced() {
        let mut value = sample_wire();
        value["priority"] = json!("Critical");
        let err = Notification::from_wire(WireNotification::from_value(value).unwrap()).unwrap_err();
        assert_eq!(err.field(), "priority");

        let mut value = sample_wire();
        value["created_at"] = json!("yesterday");
        let err = Notification::from_wire(WireNotification::from_value(value).unwrap()).unwrap_err();
        assert_eq!(err.field(), "created_at");

        let err = WireNotification::from_value(json!({ "id": 42 })).unwrap_err();
        assert_eq!(err.field(), "payload");
    }

    #[test]
    fn test_filter_mapping() {
        let filter = NotificationFilter {
            kind: Some(NotificationType::Update),
            unread_only: Some(true),
            limit: Some(20),
            ..Default::default()
        };
        let wire = filter.to_wire();
        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            json!({ "notification_type": "Update", "unread_only": true, "limit": 20 })
        );
        assert_eq!(NotificationFilter::from_wire(wire).unwrap(), filter);
    }

    #[test]
    fn test_create_request_mapping() {
        let request = CreateNotificationRequest::new("p1", NotificationType::Game, "Achievement", "Unlocked")
            .with_priority(NotificationPriority::Low);
        let wire = request.to_wire();
        assert_eq!(wire.notification_type.as_deref(), Some("Game"));
        assert!(wire.metadata.is_none());
        assert_eq!(CreateNotificationRequest::from_wire(wire).unwrap(), request);

        let err = CreateNotificationRequest::from_wire(WireCreateNotificationRequest::default()).unwrap_err();
        assert_eq!(err.field(), "notification_type");
    }

    #[test]
    fn test_preferences_round_trip_keeps_unknown_kinds() {
        let mut prefs = NotificationPreferences::defaults_for(
            "p1",
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        );
        prefs.type_settings.insert(
            NotificationType::Other("Achievement".to_string()),
            TypePreference::default(),
        );
        prefs.quiet_hours = Some(QuietHours {
            enabled: true,
            start_time: "22:00".to_string(),
            end_time: "07:00".to_string(),
            allow_urgent: false,
        });

        let wire = prefs.to_wire();
        assert!(wire.type_settings.as_ref().unwrap().contains_key("Achievement"));
        assert!(wire.type_settings.as_ref().unwrap().contains_key("Security"));
        assert_eq!(NotificationPreferences::from_wire(wire).unwrap(), prefs);
    }

    #[test]
    fn test_preferences_missing_field_is_named() {
        let mut wire = NotificationPreferences::defaults_for("p1", Utc::now()).to_wire();
        wire.sound_enabled = None;
        let err = NotificationPreferences::from_wire(wire).unwrap_err();
        assert_eq!(err.field(), "sound_enabled");
    }

    fn arb_kind() -> impl Strategy<Value = NotificationType> {
        prop_oneof![
            Just(NotificationType::System),
            Just(NotificationType::Security),
            Just(NotificationType::Update),
            Just(NotificationType::Custom),
            "[A-Z][a-z]{3,10}".prop_filter_map("known kind", |s| {
                let kind = NotificationType::parse(&s);
                (!kind.is_known()).then_some(kind)
            }),
        ]
    }

    fn arb_priority() -> impl Strategy<Value = NotificationPriority> {
        prop_oneof![
            Just(NotificationPriority::Low),
            Just(NotificationPriority::Normal),
            Just(NotificationPriority::High),
            Just(NotificationPriority::Urgent),
        ]
    }

    fn arb_time() -> impl Strategy<Value = DateTime<Utc>> {
        (0i64..4_000_000_000, 0u32..1_000).prop_map(|(secs, millis)| {
            Utc.timestamp_opt(secs, millis * 1_000_000).unwrap()
        })
    }

    fn arb_custom_data() -> impl Strategy<Value = Option<serde_json::Map<String, serde_json::Value>>> {
        let scalar = prop_oneof![
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            ".{0,12}".prop_map(serde_json::Value::from),
        ];
        proptest::option::of(
            proptest::collection::btree_map("[a-z_]{1,8}", scalar, 0..4)
                .prop_map(|entries| entries.into_iter().collect()),
        )
    }

    fn arb_notification() -> impl Strategy<Value = Notification> {
        (
            "[a-z0-9-]{1,16}",
            "[a-z0-9]{1,8}",
            arb_kind(),
            (".{0,40}", ".{0,80}", proptest::option::of(".{0,20}"), proptest::option::of(".{0,20}")),
            arb_priority(),
            (arb_time(), proptest::option::of(arb_time()), proptest::option::of(arb_time())),
            ("[a-z]{1,8}", "[a-z]{1,8}", proptest::collection::vec("[a-z]{1,6}", 0..4), arb_custom_data()),
        )
            .prop_map(
                |(id, profile_id, kind, (title, message, icon, action_url), priority, (created_at, read_at, expires_at), (source, category, tags, custom_data))| {
                    Notification {
                        id,
                        profile_id,
                        kind,
                        content: NotificationContent {
                            title,
                            message,
                            icon,
                            action_url,
                        },
                        priority,
                        created_at,
                        read_at,
                        expires_at,
                        metadata: NotificationMetadata {
                            source,
                            category,
                            tags,
                            custom_data,
                        },
                    }
                },
            )
    }

    fn arb_type_preference() -> impl Strategy<Value = TypePreference> {
        (any::<bool>(), arb_priority(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(enabled, priority, show_toast, play_sound, persist_in_center)| TypePreference {
                enabled,
                priority,
                show_toast,
                play_sound,
                persist_in_center,
            },
        )
    }

    fn arb_preferences() -> impl Strategy<Value = NotificationPreferences> {
        (
            "[a-z0-9]{1,8}",
            (any::<bool>(), any::<bool>(), any::<bool>()),
            proptest::collection::btree_map(arb_kind(), arb_type_preference(), 0..6),
            proptest::option::of((any::<bool>(), "[0-2][0-9]:[0-5][0-9]", "[0-2][0-9]:[0-5][0-9]", any::<bool>())),
            (any::<u32>(), any::<u32>()),
            arb_time(),
        )
            .prop_map(
                |(profile_id, (global_enabled, sound_enabled, desktop_enabled), type_settings, quiet_hours, (max_notifications, auto_delete_after_days), updated_at)| {
                    NotificationPreferences {
                        profile_id,
                        delivery: DeliverySettings {
                            global_enabled,
                            sound_enabled,
                            desktop_enabled,
                        },
                        type_settings,
                        quiet_hours: quiet_hours.map(|(enabled, start_time, end_time, allow_urgent)| QuietHours {
                            enabled,
                            start_time,
                            end_time,
                            allow_urgent,
                        }),
                        retention: RetentionPolicy {
                            max_notifications,
                            auto_delete_after_days,
                        },
                        updated_at,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_preferences_round_trip(prefs in arb_preferences()) {
            let wire = prefs.to_wire();
            let back = NotificationPreferences::from_wire(wire.clone()).unwrap();
            prop_assert_eq!(&back, &prefs);
            prop_assert_eq!(back.to_wire(), wire);
        }

        #[test]
        fn prop_notification_round_trip(n in arb_notification()) {
            let wire = n.to_wire();
            let back = Notification::from_wire(wire.clone()).unwrap();
            prop_assert_eq!(&back, &n);
            prop_assert_eq!(back.to_wire(), wire);
        }
    }
}
