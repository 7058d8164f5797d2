//! Streaming feed ingestion
//!
//! Connects to the server's streaming WebSocket, decodes `{event, payload}`
//! frames into [`Event`]s and hands them to a handler one at a time. The
//! connection is re-established with exponential backoff after any drop;
//! transport errors never escape [`StreamIngestor::run`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::types::{Event, Notification};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Consumer of decoded streaming events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event);
}

/// One raw streaming frame. The payload is itself JSON-encoded.
#[derive(Debug, Deserialize)]
struct Frame {
    event: String,
    payload: String,
}

/// Decode a raw frame into an event. Frames the agent does not react to
/// decode to `None`.
pub fn decode_frame(raw: &str) -> Option<Event> {
    let frame: Frame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "undecodable frame, ignoring");
            return None;
        }
    };

    if frame.event != "notification" {
        return None;
    }

    let notification: Notification = match serde_json::from_str(&frame.payload) {
        Ok(notification) => notification,
        Err(e) => {
            warn!(error = %e, "undecodable notification payload, ignoring");
            return None;
        }
    };

    match notification.kind.as_str() {
        "follow" => notification
            .account
            .map(|account| Event::Follow { account }),
        "mention" => notification.status.map(|status| Event::Mention { status }),
        _ => None,
    }
}

pub struct StreamIngestor {
    url: String,
    access_token: String,
}

impl StreamIngestor {
    /// Build the ingestor from the configured server URL and streaming
    /// path, selecting the user stream.
    pub fn new(config: &Config) -> Self {
        let url = format!("{}{}?stream=user", config.server_url, config.streaming_path)
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        Self {
            url,
            access_token: config.access_token.clone(),
        }
    }

    /// Connect and deliver events until cancelled. Reconnects forever on
    /// connection loss, doubling the delay up to a cap and resetting it
    /// after each successful connection.
    pub async fn run(&self, handler: &dyn EventHandler) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.connect().await {
                Ok(stream) => {
                    info!(url = %self.url, "streaming connection established");
                    backoff = INITIAL_BACKOFF;
                    self.listen(stream, handler).await;
                    info!("streaming connection closed");
                }
                Err(e) => {
                    warn!(error = %e, "streaming connection failed");
                }
            }
            debug!(delay_secs = backoff.as_secs(), "reconnecting after delay");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect(&self) -> Result<WsStream> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ApiError::Network(format!("invalid streaming URL: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|e| ApiError::Authentication(format!("invalid access token: {}", e)))?;
        request.headers_mut().insert("Authorization", bearer);

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| ApiError::Network(format!("streaming connect failed: {}", e)))?;
        Ok(stream)
    }

    /// Read frames until the connection drops, invoking the handler for
    /// each decoded event. Delivery is sequential; the next frame is not
    /// read before the handler returns.
    async fn listen(&self, mut stream: WsStream, handler: &dyn EventHandler) {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Some(event) = decode_frame(&text) {
                        handler.handle(event).await;
                    }
                }
                Ok(Message::Close(_)) => return,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "streaming read failed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Visibility;

    fn frame(event: &str, payload: serde_json::Value) -> String {
        serde_json::json!({
            "event": event,
            "payload": payload.to_string(),
        })
        .to_string()
    }

    #[test]
    fn test_decodes_mention_notification() {
        let raw = frame(
            "notification",
            serde_json::json!({
                "type": "mention",
                "account": {"id": "9", "acct": "alice"},
                "status": {
                    "id": "100",
                    "visibility": "direct",
                    "content": "<p>hello</p>",
                    "account": {"id": "9", "acct": "alice"}
                }
            }),
        );

        match decode_frame(&raw) {
            Some(Event::Mention { status }) => {
                assert_eq!(status.id, "100");
                assert_eq!(status.visibility, Visibility::Direct);
            }
            other => panic!("expected mention, got {:?}", other),
        }
    }

    #[test]
    fn test_decodes_follow_notification() {
        let raw = frame(
            "notification",
            serde_json::json!({
                "type": "follow",
                "account": {"id": "9", "acct": "alice"}
            }),
        );

        match decode_frame(&raw) {
            Some(Event::Follow { account }) => assert_eq!(account.acct, "alice"),
            other => panic!("expected follow, got {:?}", other),
        }
    }

    #[test]
    fn test_ignores_other_notification_types() {
        let raw = frame(
            "notification",
            serde_json::json!({
                "type": "favourite",
                "account": {"id": "9", "acct": "alice"}
            }),
        );
        assert_eq!(decode_frame(&raw), None);
    }

    #[test]
    fn test_ignores_non_notification_frames() {
        let raw = frame("update", serde_json::json!({"id": "100"}));
        assert_eq!(decode_frame(&raw), None);
    }

    #[test]
    fn test_ignores_garbage() {
        assert_eq!(decode_frame("not json"), None);
        assert_eq!(decode_frame(r#"{"event": "notification", "payload": "{"}"#), None);
    }

    #[test]
    fn test_url_construction() {
        let mut config = Config::default();
        config.server_url = "https://mastodon.test".to_string();
        config.access_token = "token".to_string();
        let ingestor = StreamIngestor::new(&config);
        assert_eq!(
            ingestor.url,
            "wss://mastodon.test/api/v1/streaming?stream=user"
        );
    }
}
