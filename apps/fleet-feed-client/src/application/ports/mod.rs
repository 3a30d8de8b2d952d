//! Port Interfaces
//!
//! Defines the transport contract the feed client consumes, following the
//! Hexagonal Architecture pattern. Any duplex streaming connection that can
//! report messages, errors and closure (a WebSocket, a managed streaming
//! client, a test double) plugs in here.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`]: opens receive-only connections to an endpoint
//! - [`TransportStream`]: one open connection, yielding [`TransportEvent`]s

use async_trait::async_trait;

use crate::domain::connection::ABNORMAL_CLOSURE_CODE;

/// Errors reported by a transport while opening a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint address cannot be used.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Close details reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close code.
    pub code: u16,
    /// Whether the close handshake completed.
    pub was_clean: bool,
}

impl CloseFrame {
    /// A negotiated close with the given code.
    #[must_use]
    pub const fn clean(code: u16) -> Self {
        Self {
            code,
            was_clean: true,
        }
    }

    /// A dropped connection (code 1006, no handshake).
    #[must_use]
    pub const fn abnormal() -> Self {
        Self {
            code: ABNORMAL_CLOSURE_CODE,
            was_clean: false,
        }
    }
}

/// Events produced by an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text payload arrived.
    Message(String),
    /// A low-level fault occurred. A [`TransportEvent::Closed`] usually follows.
    Error(String),
    /// The connection closed. No further events follow.
    Closed(CloseFrame),
}

/// Opens receive-only streaming connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Synchronously validate an endpoint before any I/O.
    ///
    /// The default accepts everything.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEndpoint`] if the endpoint can never be opened.
    fn prepare(&self, endpoint: &str) -> Result<(), TransportError> {
        let _ = endpoint;
        Ok(())
    }

    /// Open a connection to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn open(&self, endpoint: &str) -> Result<Box<dyn TransportStream>, TransportError>;
}

/// A single open connection.
#[async_trait]
pub trait TransportStream: Send {
    /// Wait for the next event.
    ///
    /// `None` means the stream ended without a close event, which the
    /// client treats as an abnormal closure.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close the connection from our side.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abnormal_close_frame() {
        let frame = CloseFrame::abnormal();
        assert_eq!(frame.code, 1006);
        assert!(!frame.was_clean);
        assert!(CloseFrame::clean(1000).was_clean);
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::InvalidEndpoint {
            endpoint: "nope".to_string(),
            reason: "missing scheme".to_string(),
        };
        assert_eq!(err.to_string(), "invalid endpoint nope: missing scheme");
    }
}
