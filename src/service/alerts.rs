//! Host-level alerts
//!
//! Best-effort "OS notification" raised for live arrivals. Failures never
//! reach the notification pipeline.

use crate::data::Notification;
use crate::error::NotifyError;

/// Title used for every alert
pub const ALERT_TITLE: &str = "Nexus Social";
/// Icon shown with every alert
pub const ALERT_ICON: &str = "/logo.png";

/// Whether the host lets us raise alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPermission {
    Granted,
    Denied,
    /// Not decided yet; the client asks once during `initialize`
    Default,
}

/// Alert payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopAlert {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub link: Option<String>,
}

impl DesktopAlert {
    pub fn for_notification(notification: &Notification) -> Self {
        Self {
            title: ALERT_TITLE.to_string(),
            body: notification.content.clone(),
            icon: ALERT_ICON.to_string(),
            link: notification.link.clone(),
        }
    }
}

/// Destination for alerts
#[cfg_attr(test, mockall::automock)]
pub trait AlertSink: Send + Sync {
    /// Current permission
    fn permission(&self) -> AlertPermission;

    /// Ask the host for permission; returns the outcome
    fn request_permission(&self) -> AlertPermission;

    /// Raise one alert
    fn show(&self, alert: &DesktopAlert) -> Result<(), NotifyError>;
}

/// Sink for hosts without alert support
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlerts;

impl AlertSink for NoAlerts {
    fn permission(&self) -> AlertPermission {
        AlertPermission::Denied
    }

    fn request_permission(&self) -> AlertPermission {
        AlertPermission::Denied
    }

    fn show(&self, _alert: &DesktopAlert) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Sink that writes alerts to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn permission(&self) -> AlertPermission {
        AlertPermission::Granted
    }

    fn request_permission(&self) -> AlertPermission {
        AlertPermission::Granted
    }

    fn show(&self, alert: &DesktopAlert) -> Result<(), NotifyError> {
        tracing::info!(
            title = %alert.title,
            body = %alert.body,
            link = ?alert.link,
            "Notification alert"
        );
        Ok(())
    }
}
