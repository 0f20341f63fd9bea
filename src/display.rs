//! Presentation helpers for notification lists

use chrono::{DateTime, Utc};

use crate::data::{Notification, NotificationKind};

/// Icon shown next to a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icon {
    /// Icon name in the UI icon set
    pub name: &'static str,
    /// Accent color
    pub color: &'static str,
}

/// Icon for a notification kind
pub fn icon(kind: NotificationKind) -> Icon {
    match kind {
        NotificationKind::Like => Icon { name: "heart", color: "red" },
        NotificationKind::Comment => Icon { name: "message-circle", color: "blue" },
        NotificationKind::Follow => Icon { name: "user-plus", color: "green" },
        NotificationKind::Story => Icon { name: "image", color: "purple" },
        _ => Icon { name: "bell", color: "cyan" },
    }
}

/// Unread badge text; `None` hides the badge
pub fn badge_label(unread: u64) -> Option<String> {
    match unread {
        0 => None,
        1..=9 => Some(unread.to_string()),
        _ => Some("9+".to_string()),
    }
}

/// Age of `created_at` relative to `now`
///
/// "just now" under a minute, then minutes, hours and days up to a week,
/// after that the calendar date. Future timestamps count as "just now".
pub fn relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - created_at).num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = hours / 24;
    if days < 7 {
        return format!("{}d ago", days);
    }

    created_at.format("%Y-%m-%d").to_string()
}

/// One-line rendering used by the terminal client
pub fn summary_line(notification: &Notification, now: DateTime<Utc>) -> String {
    let marker = if notification.read { " " } else { "*" };
    let age = notification
        .created_at_utc()
        .map(|created_at| relative_time(created_at, now))
        .unwrap_or_else(|| notification.created_at.clone());

    format!(
        "{} [{}] {} ({})",
        marker,
        icon(notification.kind).name,
        notification.content,
        age
    )
}
