//! Bearer credential handling
//!
//! Holds the session token and decodes the user id used to address the
//! push channel.

pub mod credential;

pub use credential::{BearerToken, CredentialStore};
