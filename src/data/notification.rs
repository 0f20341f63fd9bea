//! Notification projection
//!
//! The backend owns notifications; the client holds a read-only copy and
//! only ever flips `read`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single notification as delivered by `GET /notifications/` or the push
/// channel. Extra backend fields (`_id`, `recipient_id`) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub sender_id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub content: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    /// ISO-8601 timestamp, kept verbatim
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Notification {
    /// Parse `created_at`, if it is a valid RFC 3339 timestamp
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

/// Parse backend timestamps; naive ones (no offset) are taken as UTC
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// What triggered a notification
///
/// Unknown, missing or `null` wire values all become `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Story,
    #[default]
    Other,
}

impl NotificationKind {
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "like" => NotificationKind::Like,
            "comment" => NotificationKind::Comment,
            "follow" => NotificationKind::Follow,
            "story" => NotificationKind::Story,
            _ => NotificationKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::Story => "story",
            NotificationKind::Other => "other",
        }
    }
}

impl Serialize for NotificationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Any JSON shape is accepted; only strings can name a known kind.
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(raw
            .as_str()
            .map(NotificationKind::from_wire)
            .unwrap_or_default())
    }
}

/// `GET /notifications/unread-count` response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

/// Acknowledgement body of the `PUT` endpoints
///
/// The backend answers 200 with `{"success": false, "error": ...}` when the
/// notification does not belong to the caller, so the status alone is not
/// enough.
#[derive(Debug, Clone, Deserialize)]
pub struct Acknowledgement {
    #[serde(default = "default_success")]
    pub success: bool,
    pub error: Option<String>,
    pub count: Option<u64>,
}

fn default_success() -> bool {
    true
}

/// A success status without a readable body counts as success
impl Default for Acknowledgement {
    fn default() -> Self {
        Self {
            success: true,
            error: None,
            count: None,
        }
    }
}
