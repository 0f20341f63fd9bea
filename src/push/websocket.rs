//! WebSocket push connector

use futures::StreamExt;
use futures::future::BoxFuture;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use super::{PushConnector, PushStream};
use crate::auth::BearerToken;
use crate::error::NotifyError;

/// Opens the push channel over WebSocket
///
/// The bearer token also travels in the handshake `Authorization` header so
/// the backend can check it against the user id in the path.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl PushConnector for WebSocketConnector {
    fn connect<'a>(
        &'a self,
        url: &'a url::Url,
        token: &'a BearerToken,
    ) -> BoxFuture<'a, Result<PushStream, NotifyError>> {
        Box::pin(async move {
            let mut request = url.as_str().into_client_request()?;
            let header = http::HeaderValue::from_str(&token.header_value())
                .map_err(|_| NotifyError::InvalidCredential("token is not a valid header".to_string()))?;
            request
                .headers_mut()
                .insert(http::header::AUTHORIZATION, header);

            let (socket, response) = tokio_tungstenite::connect_async(request).await?;
            tracing::debug!(status = %response.status(), "Push handshake completed");

            // Ends at the close frame, or right after the first transport error.
            let stream = socket
                .scan(false, |failed, frame| {
                    let next = if *failed {
                        None
                    } else {
                        match frame {
                            Ok(Message::Close(_)) => None,
                            Err(error) => {
                                *failed = true;
                                Some(Err(error))
                            }
                            other => Some(other),
                        }
                    };
                    futures::future::ready(next)
                })
                .filter_map(|frame| futures::future::ready(decode_frame(frame)));

            Ok(stream.boxed())
        })
    }
}

/// Keep text payloads, surface errors, drop control frames
fn decode_frame(
    frame: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<String, NotifyError>> {
    match frame {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => Some(String::from_utf8(bytes).map_err(|e| {
            NotifyError::MalformedPushPayload(format!("binary frame is not UTF-8: {}", e))
        })),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Close(_)) => None,
        Err(error) => Some(Err(error.into())),
    }
}
