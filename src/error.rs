//! Error types for nexus-notify
//!
//! Every failure in the notification client is expressed as `NotifyError`.
//! Callers decide what to do with `Unauthenticated` (refresh the credential
//! or send the user back to login); everything else is logged by the client
//! and never takes the host application down.

use thiserror::Error;

/// Client-wide error type
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Credential missing, expired, or rejected by the backend
    #[error("Authentication required")]
    Unauthenticated,

    /// Network failure that is not an authentication problem
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// Backend acknowledged the request but refused it (`{"success": false}`)
    #[error("Request rejected by backend: {0}")]
    Rejected(String),

    /// Push message that is not a JSON notification
    #[error("Malformed push payload: {0}")]
    MalformedPushPayload(String),

    /// Push channel closed (cleanly or not)
    #[error("Push connection lost")]
    ConnectionLost,

    /// Bearer token could not be decoded for channel addressing
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl NotifyError {
    /// Whether the backend (or the absence of a credential) refused us
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, NotifyError::Unauthenticated)
    }

    /// Whether retrying the same operation later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::TransientNetwork(_)
            | NotifyError::Http(_)
            | NotifyError::ConnectionLost
            | NotifyError::Rejected(_) => true,
            NotifyError::UnexpectedStatus(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyError::Unauthenticated => "unauthenticated",
            NotifyError::TransientNetwork(_) => "transient_network",
            NotifyError::Http(_) => "http_client",
            NotifyError::UnexpectedStatus(_) => "unexpected_status",
            NotifyError::Rejected(_) => "rejected",
            NotifyError::MalformedPushPayload(_) => "malformed_push_payload",
            NotifyError::ConnectionLost => "connection_lost",
            NotifyError::InvalidCredential(_) => "invalid_credential",
            NotifyError::Config(_) => "config",
            NotifyError::Internal(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for NotifyError {
    fn from(err: config::ConfigError) -> Self {
        NotifyError::Config(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NotifyError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Http(response)
                if response.status() == http::StatusCode::UNAUTHORIZED
                    || response.status() == http::StatusCode::FORBIDDEN =>
            {
                NotifyError::Unauthenticated
            }
            WsError::Http(response) => NotifyError::UnexpectedStatus(response.status().as_u16()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => NotifyError::ConnectionLost,
            other => NotifyError::TransientNetwork(other.to_string()),
        }
    }
}

/// Result type alias using NotifyError
pub type Result<T> = std::result::Result<T, NotifyError>;
