//! API layer
//!
//! Authenticated REST calls against the notification backend.

mod notifications;

pub use notifications::NotificationApi;
