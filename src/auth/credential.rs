//! Bearer credential handling
//!
//! Token format: base64url(header).base64url(claims).signature
//!
//! Only the claims segment is decoded, and only to address the push
//! channel. The signature is never checked here; the backend owns
//! verification.

use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::NotifyError;

/// Bearer token presented to the backend
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Decode the `sub` claim (user id) from the token payload
    ///
    /// # Errors
    /// Returns `InvalidCredential` if the token is not three dot-separated
    /// segments, the middle segment is not base64url JSON, or `sub` is
    /// missing
    pub fn subject(&self) -> Result<String, NotifyError> {
        use base64::{Engine as _, engine::general_purpose};

        let parts: Vec<&str> = self.0.split('.').collect();
        if parts.len() != 3 {
            return Err(NotifyError::InvalidCredential(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }

        let payload_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1].trim_end_matches('='))
            .map_err(|e| NotifyError::InvalidCredential(format!("payload is not base64url: {}", e)))?;

        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| NotifyError::InvalidCredential(format!("payload is not JSON: {}", e)))?;

        match claims.sub {
            Some(serde_json::Value::String(sub)) if !sub.is_empty() => Ok(sub),
            Some(serde_json::Value::Number(sub)) => Ok(sub.to_string()),
            _ => Err(NotifyError::InvalidCredential(
                "missing sub claim".to_string(),
            )),
        }
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<serde_json::Value>,
}

/// Holder for the current credential
///
/// Cheap to clone; all clones share the same slot. Login flows call `set`,
/// logout calls `clear`. The notification client only reads it.
#[derive(Clone, Default)]
pub struct CredentialStore {
    token: Arc<RwLock<Option<BearerToken>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Store a new token, replacing any previous one
    pub fn set(&self, token: impl Into<String>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(BearerToken::new(token));
    }

    /// Forget the stored token
    pub fn clear(&self) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    /// Current token, if any
    pub fn current(&self) -> Option<BearerToken> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Current token or `Unauthenticated`
    pub fn require(&self) -> Result<BearerToken, NotifyError> {
        self.current().ok_or(NotifyError::Unauthenticated)
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("present", &self.current().is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_token(claims: serde_json::Value) -> String {
    use base64::{Engine as _, engine::general_purpose};

    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.signature", header, payload)
}
