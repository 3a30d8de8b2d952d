//! WebSocket Transport
//!
//! [`Transport`] adapter over `tokio-tungstenite`. Supports `ws://` and
//! `wss://` endpoints; TLS uses rustls with the webpki root store.
//!
//! # Event Mapping
//!
//! | WebSocket                | [`TransportEvent`]                  |
//! |--------------------------|-------------------------------------|
//! | text frame               | `Message`                           |
//! | close frame              | `Closed` (clean, peer's code)       |
//! | read error               | `Error`, then `Closed` (code 1006)  |
//! | stream end, no close     | `Closed` (code 1006)                |
//! | binary / ping / pong     | ignored                             |

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{
    CloseFrame, Transport, TransportError, TransportEvent, TransportStream,
};

/// Close code used when the peer sends a close frame without a status.
const NO_STATUS_CODE: u16 = 1005;

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn prepare(&self, endpoint: &str) -> Result<(), TransportError> {
        let invalid = |reason: String| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let request = endpoint
            .into_client_request()
            .map_err(|e| invalid(e.to_string()))?;

        match request.uri().scheme_str() {
            Some("ws" | "wss") => {}
            Some(other) => return Err(invalid(format!("unsupported scheme `{other}`"))),
            None => return Err(invalid("missing scheme".to_string())),
        }

        if request.uri().host().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }

        Ok(())
    }

    async fn open(&self, endpoint: &str) -> Result<Box<dyn TransportStream>, TransportError> {
        let (ws, response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WebSocketConnection {
            ws,
            pending_close: None,
            finished: false,
        }))
    }
}

/// One open WebSocket connection.
struct WebSocketConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending_close: Option<CloseFrame>,
    finished: bool,
}

#[async_trait]
impl TransportStream for WebSocketConnection {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        if let Some(frame) = self.pending_close.take() {
            self.finished = true;
            return Some(TransportEvent::Closed(frame));
        }

        if self.finished {
            return None;
        }

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map_or(NO_STATUS_CODE, |f| u16::from(f.code));
                    self.finished = true;
                    return Some(TransportEvent::Closed(CloseFrame::clean(code)));
                }
                Some(Ok(_)) => {
                    tracing::trace!("Ignoring non-text frame");
                }
                Some(Err(e)) => {
                    self.pending_close = Some(CloseFrame::abnormal());
                    return Some(TransportEvent::Error(e.to_string()));
                }
                None => {
                    self.finished = true;
                    return Some(TransportEvent::Closed(CloseFrame::abnormal()));
                }
            }
        }
    }

    async fn close(&mut self) {
        self.finished = true;
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "WebSocket close failed");
        }
    }
}
