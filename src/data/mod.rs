//! Data layer module
//!
//! - Notification projection and wire types
//! - In-memory notification store (volatile)

mod notification;
mod store;

pub use notification::{Acknowledgement, Notification, NotificationKind, UnreadCount};
pub use store::{NotificationStore, PendingChange, PushOutcome};
