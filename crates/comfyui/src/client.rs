//! WebSocket client for a ComfyUI instance's event channel.
//!
//! [`ComfyUIClient`] holds the connection configuration. Call
//! [`ComfyUIClient::connect`] to establish a live [`ComfyUIConnection`],
//! then [`ComfyUIConnection::into_messages`] to consume it as a stream
//! of typed [`ComfyUIMessage`]s.

use futures::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::messages::{parse_message, ComfyUIMessage};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the event channel of one ComfyUI server.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
///
/// Dropping the connection closes the underlying socket.
pub struct ComfyUIConnection {
    /// Client ID sent during the WebSocket handshake. The server only
    /// addresses execution events to the client that queued the prompt.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl ComfyUIClient {
    /// Create a new client.
    ///
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
        }
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect to the ComfyUI WebSocket endpoint as `client_id`.
    ///
    /// The id must be the same one passed to `POST /prompt`, otherwise
    /// the server will not route that prompt's execution events here.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::debug!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

impl ComfyUIConnection {
    /// Consume the connection as a stream of parsed messages.
    ///
    /// Binary frames (preview images) and text frames that do not parse
    /// as a known message are skipped. The stream ends when the server
    /// sends a Close frame or the socket is exhausted, and yields one
    /// [`ComfyUIClientError::Protocol`] item if a read fails.
    pub fn into_messages(
        self,
    ) -> impl Stream<Item = Result<ComfyUIMessage, ComfyUIClientError>> + Send + 'static {
        futures::stream::unfold(Some(self.ws_stream), |state| async move {
            let mut ws = state?;
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => match parse_message(&text) {
                        Ok(msg) => return Some((Ok(msg), Some(ws))),
                        Err(e) => {
                            tracing::debug!(error = %e, "Skipping unrecognised ComfyUI message");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "ComfyUI closed the event channel");
                        return None;
                    }
                    // Binary previews, pings and pongs carry nothing we track.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let err = ComfyUIClientError::Protocol(e.to_string());
                        return Some((Err(err), None));
                    }
                    None => return None,
                }
            }
        })
    }
}

/// Derive the WebSocket base URL from an HTTP base URL
/// (`http` becomes `ws`, `https` becomes `wss`).
pub fn ws_url_from_http(api_url: &str) -> String {
    let api_url = api_url.trim_end_matches('/');
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_swaps_scheme() {
        assert_eq!(ws_url_from_http("http://host:8188"), "ws://host:8188");
        assert_eq!(ws_url_from_http("https://gpu.example.com/"), "wss://gpu.example.com");
        assert_eq!(ws_url_from_http("ws://already"), "ws://already");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = ComfyUIClient::new("ws://host:8188/".into());
        assert_eq!(client.ws_url(), "ws://host:8188");
    }

    #[tokio::test]
    async fn connect_to_closed_port_is_connection_error() {
        let client = ComfyUIClient::new("ws://127.0.0.1:9".into());
        let err = client.connect("abc").await.err().unwrap();
        assert!(matches!(err, ComfyUIClientError::Connection(_)));
    }
}
