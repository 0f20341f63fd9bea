//! nexus-notify - real-time notification client for Nexus Social
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 NotificationClient (service)                 │
//! │  - initialize / fetch / mark read / open                    │
//! │  - connection supervisor and reconnect schedule             │
//! │  - event broadcast                                          │
//! └─────────────────────────────────────────────────────────────┘
//!          │                       │                      │
//! ┌─────────────────┐  ┌──────────────────────┐  ┌────────────────┐
//! │  REST (reqwest) │  │ Push (tungstenite)   │  │ Store (memory) │
//! │  list, counter, │  │ one JSON per message │  │ dedup by id,   │
//! │  mark read      │  │                      │  │ read state     │
//! └─────────────────┘  └──────────────────────┘  └────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: REST endpoints
//! - `auth`: Bearer credential holder
//! - `config`: Configuration management
//! - `data`: Notification model and the reconciling store
//! - `display`: Presentation helpers
//! - `error`: Error types
//! - `metrics`: Prometheus metrics
//! - `push`: Push channel connector and reconnect policy
//! - `service`: `NotificationClient`

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod metrics;
pub mod push;
pub mod service;

pub use auth::CredentialStore;
pub use data::{Notification, NotificationKind};
pub use error::{NotifyError, Result};
pub use push::ConnectionState;
pub use service::{NotificationClient, NotificationEvent};
