//! Service layer
//!
//! `NotificationClient` ties the REST API, the push channel and the local
//! store together. Alerts are a pluggable side effect of live arrivals.

mod alerts;
mod notifications;

pub use alerts::{ALERT_ICON, ALERT_TITLE, AlertPermission, AlertSink, DesktopAlert, LogAlerts, NoAlerts};
pub use notifications::{NotificationClient, NotificationClientBuilder, NotificationEvent};
