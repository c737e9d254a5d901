//! Notification model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Maximum title length accepted by the host.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum message length accepted by the host.
pub const MAX_MESSAGE_LEN: usize = 1000;
/// Maximum action URL length accepted by the host.
pub const MAX_ACTION_URL_LEN: usize = 500;

/// Kind of notification.
///
/// Unknown kinds coming from the host are preserved verbatim in
/// [`NotificationType::Other`] so they survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum NotificationType {
    System,
    Profile,
    Security,
    Update,
    Game,
    Store,
    Custom,
    Other(String),
}

impl NotificationType {
    /// All kinds known to this client.
    pub const KNOWN: [NotificationType; 7] = [
        Self::System,
        Self::Profile,
        Self::Security,
        Self::Update,
        Self::Game,
        Self::Store,
        Self::Custom,
    ];

    /// Parse a kind name case-insensitively. Never fails.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "system" => Self::System,
            "profile" => Self::Profile,
            "security" => Self::Security,
            "update" => Self::Update,
            "game" => Self::Game,
            "store" => Self::Store,
            "custom" => Self::Custom,
            _ => Self::Other(input.to_string()),
        }
    }

    /// Lowercase name used by the internal model.
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::Profile => "profile",
            Self::Security => "security",
            Self::Update => "update",
            Self::Game => "game",
            Self::Store => "store",
            Self::Custom => "custom",
            Self::Other(name) => name,
        }
    }

    /// Name used by the host (its enum variant name).
    pub fn wire_name(&self) -> &str {
        match self {
            Self::System => "System",
            Self::Profile => "Profile",
            Self::Security => "Security",
            Self::Update => "Update",
            Self::Game => "Game",
            Self::Store => "Store",
            Self::Custom => "Custom",
            Self::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for NotificationType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<NotificationType> for String {
    fn from(value: NotificationType) -> Self {
        value.as_str().to_string()
    }
}

/// Priority level, ordered from least to most important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for NotificationPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl NotificationPriority {
    /// Parse a priority name case-insensitively.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// Name used by the host.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// Display content of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
    pub icon: Option<String>,
    pub action_url: Option<String>,
}

impl NotificationContent {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            icon: None,
            action_url: None,
        }
    }
}

/// Opaque metadata, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMetadata {
    pub source: String,
    pub category: String,
    pub tags: Vec<String>,
    pub custom_data: Option<Map<String, Value>>,
}

impl Default for NotificationMetadata {
    fn default() -> Self {
        Self {
            source: "system".to_string(),
            category: "general".to_string(),
            tags: Vec::new(),
            custom_data: None,
        }
    }
}

/// A single alert surfaced to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub profile_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub content: NotificationContent,
    pub priority: NotificationPriority,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: NotificationMetadata,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// Stamp the read time. An existing stamp is never replaced or cleared.
    ///
    /// Returns true if the notification was unread before the call.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.read_at.is_none() {
            self.read_at = Some(at);
            true
        } else {
            false
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn belongs_to(&self, profile_id: &str) -> bool {
        self.profile_id == profile_id
    }
}

/// Request to create a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub profile_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub content: NotificationContent,
    pub priority: Option<NotificationPriority>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Option<NotificationMetadata>,
}

impl CreateNotificationRequest {
    pub fn new(
        profile_id: impl Into<String>,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            kind,
            content: NotificationContent::new(title, message),
            priority: None,
            expires_at: None,
            metadata: None,
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Apply the same content rules the host enforces.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let title = self.content.title.trim();
        if title.is_empty() {
            return Err(Error::validation("notification title is empty"));
        }
        if self.content.title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::validation(format!(
                "notification title too long (max {MAX_TITLE_LEN} characters)"
            )));
        }

        if self.content.message.trim().is_empty() {
            return Err(Error::validation("notification message is empty"));
        }
        if self.content.message.chars().count() > MAX_MESSAGE_LEN {
            return Err(Error::validation(format!(
                "notification message too long (max {MAX_MESSAGE_LEN} characters)"
            )));
        }

        if self.profile_id.trim().is_empty() {
            return Err(Error::validation("profile id is empty"));
        }

        if let Some(url) = &self.content.action_url
            && url.chars().count() > MAX_ACTION_URL_LEN
        {
            return Err(Error::validation(format!(
                "action URL too long (max {MAX_ACTION_URL_LEN} characters)"
            )));
        }

        if let Some(expires_at) = self.expires_at
            && expires_at <= now
        {
            return Err(Error::validation("expiry must be in the future"));
        }

        Ok(())
    }
}

/// Query filter for listing notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFilter {
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    pub priority: Option<NotificationPriority>,
    pub unread_only: Option<bool>,
    pub category: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl NotificationFilter {
    pub fn unread() -> Self {
        Self {
            unread_only: Some(true),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: NotificationType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_window(mut self, offset: u32, limit: u32) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Whether a notification passes every set criterion. Paging is ignored.
    pub fn matches(&self, notification: &Notification) -> bool {
        if let Some(kind) = &self.kind
            && &notification.kind != kind
        {
            return false;
        }
        if let Some(priority) = self.priority
            && notification.priority != priority
        {
            return false;
        }
        if self.unread_only == Some(true) && notification.is_read() {
            return false;
        }
        if let Some(category) = &self.category
            && &notification.metadata.category != category
        {
            return false;
        }
        true
    }
}

/// Counts derived from a notification list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCounts {
    pub total: usize,
    pub unread: usize,
    pub by_type: BTreeMap<NotificationType, usize>,
    pub high_priority_unread: usize,
}

impl NotificationCounts {
    pub fn from_list(notifications: &[Notification]) -> Self {
        let mut counts = Self {
            total: notifications.len(),
            ..Default::default()
        };
        for notification in notifications {
            *counts.by_type.entry(notification.kind.clone()).or_default() += 1;
            if !notification.is_read() {
                counts.unread += 1;
                if notification.priority >= NotificationPriority::High {
                    counts.high_priority_unread += 1;
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn sample(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            profile_id: "p1".to_string(),
            kind: NotificationType::Security,
            content: NotificationContent::new("Login", "New login detected"),
            priority: NotificationPriority::High,
            created_at: Utc::now(),
            read_at: None,
            expires_at: None,
            metadata: NotificationMetadata::default(),
        }
    }

    #[rstest]
    #[case("system", NotificationType::System)]
    #[case("System", NotificationType::System)]
    #[case(" UPDATE ", NotificationType::Update)]
    #[case("store", NotificationType::Store)]
    #[case("Achievement", NotificationType::Other("Achievement".to_string()))]
    fn test_type_parse(#[case] input: &str, #[case] expected: NotificationType) {
        assert_eq!(NotificationType::parse(input), expected);
    }

    #[test]
    fn test_unknown_type_keeps_its_name() {
        let kind = NotificationType::parse("Achievement");
        assert!(!kind.is_known());
        assert_eq!(kind.wire_name(), "Achievement");
        assert_eq!(kind.as_str(), "Achievement");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(NotificationPriority::Urgent > NotificationPriority::High);
        assert!(NotificationPriority::High > NotificationPriority::Normal);
        assert!(NotificationPriority::Normal > NotificationPriority::Low);
        assert_eq!(NotificationPriority::parse("URGENT"), Some(NotificationPriority::Urgent));
        assert_eq!(NotificationPriority::parse("critical"), None);
    }

    #[test]
    fn test_mark_read_never_overwrites() {
        let mut n = sample("n1");
        let first = Utc::now();
        assert!(n.mark_read(first));
        assert!(!n.mark_read(first + Duration::seconds(10)));
        assert_eq!(n.read_at, Some(first));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut n = sample("n1");
        assert!(!n.is_expired(now));
        n.expires_at = Some(now - Duration::seconds(1));
        assert!(n.is_expired(now));
    }

    #[test]
    fn test_request_validation() {
        let now = Utc::now();
        let ok = CreateNotificationRequest::new("p1", NotificationType::System, "Hi", "Body");
        assert!(ok.validate(now).is_ok());

        let empty_title = CreateNotificationRequest::new("p1", NotificationType::System, "  ", "Body");
        assert!(empty_title.validate(now).is_err());

        let long_title = CreateNotificationRequest::new(
            "p1",
            NotificationType::System,
            "x".repeat(MAX_TITLE_LEN + 1),
            "Body",
        );
        assert!(long_title.validate(now).is_err());

        let no_profile = CreateNotificationRequest::new("", NotificationType::System, "Hi", "Body");
        assert!(no_profile.validate(now).is_err());

        let past = ok.clone().with_expiry(now - Duration::minutes(1));
        assert!(past.validate(now).is_err());
    }

    #[test]
    fn test_filter_matches() {
        let mut n = sample("n1");
        assert!(NotificationFilter::default().matches(&n));
        assert!(NotificationFilter::unread().matches(&n));
        assert!(!NotificationFilter::default()
            .with_kind(NotificationType::Game)
            .matches(&n));

        n.mark_read(Utc::now());
        assert!(!NotificationFilter::unread().matches(&n));
    }

    #[test]
    fn test_counts_from_list() {
        let mut read = sample("n2");
        read.mark_read(Utc::now());
        let mut game = sample("n3");
        game.kind = NotificationType::Game;
        game.priority = NotificationPriority::Low;

        let counts = NotificationCounts::from_list(&[sample("n1"), read, game]);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.unread, 2);
        assert_eq!(counts.high_priority_unread, 1);
        assert_eq!(counts.by_type.get(&NotificationType::Security), Some(&2));
        assert_eq!(counts.by_type.get(&NotificationType::Game), Some(&1));
    }

    #[test]
    fn test_model_serializes_camel_case() {
        let json = serde_json::to_value(sample("n1")).unwrap();
        assert_eq!(json["profileId"], "p1");
        assert_eq!(json["type"], "security");
        assert_eq!(json["priority"], "high");
        assert!(json["content"]["actionUrl"].is_null());
    }
}
