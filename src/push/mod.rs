//! Push channel
//!
//! Server-to-client stream of JSON notifications, one per message.
//!
//! - `PushConnector`: opens one connection and yields text payloads until
//!   the channel closes
//! - `WebSocketConnector`: production connector (tokio-tungstenite)
//! - `ReconnectPolicy`: delay schedule between connection attempts

mod backoff;
mod websocket;

pub use backoff::ReconnectPolicy;
pub use websocket::WebSocketConnector;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::auth::BearerToken;
use crate::error::NotifyError;

/// Items of an open push channel
///
/// `Ok` carries one text payload; `Err` reports a transport error without
/// ending the channel. The stream ending means the channel is closed.
pub type PushStream = BoxStream<'static, Result<String, NotifyError>>;

/// Opens push connections
///
/// Implementations must not retry on their own; the client owns the
/// reconnection schedule.
pub trait PushConnector: Send + Sync + 'static {
    fn connect<'a>(
        &'a self,
        url: &'a url::Url,
        token: &'a BearerToken,
    ) -> BoxFuture<'a, Result<PushStream, NotifyError>>;
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and no reconnect scheduled
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Channel open
    Connected,
    /// Channel closed; a reconnect is scheduled
    Closed,
}

impl ConnectionState {
    /// Whether a supervisor currently owns the channel
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

/// Derive the push address for `user_id`
///
/// `http` maps to `ws` and `https` to `wss`; the API prefix is kept, so
/// `https://host/api` becomes `wss://host/api/notifications/ws/{user_id}`.
pub fn push_url(api_base: &url::Url, user_id: &str) -> Result<url::Url, NotifyError> {
    let scheme = match api_base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(NotifyError::Config(format!(
                "cannot derive push address from {} URL",
                other
            )));
        }
    };

    let mut url = api_base.clone();
    url.set_scheme(scheme)
        .map_err(|_| NotifyError::Config(format!("cannot switch {} to {}", api_base, scheme)))?;
    url.set_query(None);
    url.set_fragment(None);

    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| NotifyError::Config(format!("{} cannot be a base URL", api_base)))?;
        path.pop_if_empty();
        path.extend(["notifications", "ws", user_id]);
    }

    Ok(url)
}
