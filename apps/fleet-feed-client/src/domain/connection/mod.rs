//! Connection State Types
//!
//! The connection status, the recoverable error taxonomy, and the
//! [`FeedState`] tuple handed to every subscriber.

use std::sync::Arc;

use serde::Serialize;

use super::vehicle::{Fleet, Vehicle};

/// WebSocket close code reported when a connection drops without a close frame.
pub const ABNORMAL_CLOSURE_CODE: u16 = 1006;

// =============================================================================
// Connection Status
// =============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No transport is open or opening.
    #[default]
    Disconnected,
    /// A transport open is in flight.
    Connecting,
    /// The transport is open and delivering payloads.
    Connected,
}

impl ConnectionStatus {
    /// Lowercase status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    /// Human-readable status label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected to server",
        }
    }

    /// Whether the feed is live.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Feed Errors
// =============================================================================

/// Recoverable connection errors visible to subscribers.
///
/// Every variant is followed by a scheduled reconnect (bounded by the
/// attempt budget) except [`FeedError::Transport`], which only records the
/// fault and leaves scheduling to the closure that follows it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The endpoint was rejected before a connection could be opened.
    #[error("failed to open connection: {0}")]
    OpenFailed(String),

    /// The peer or network dropped the connection without a clean close.
    #[error("connection closed abnormally (code {code})")]
    ClosedAbnormally {
        /// Close code reported by the transport.
        code: u16,
    },

    /// Low-level transport fault.
    #[error("transport error occurred: {0}")]
    Transport(String),
}

impl FeedError {
    /// Short error kind used as a metric label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OpenFailed(_) => "open_failed",
            Self::ClosedAbnormally { .. } => "closed_abnormally",
            Self::Transport(_) => "transport",
        }
    }
}

// =============================================================================
// Published State
// =============================================================================

/// The state tuple delivered to subscribers.
///
/// The vehicle snapshot is shared behind an [`Arc`]; a delivered state never
/// changes after the fact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedState {
    /// Latest known state per vehicle.
    pub vehicles: Arc<Fleet>,
    /// Current connection status.
    pub status: ConnectionStatus,
    /// Last recoverable error, if any.
    pub error: Option<FeedError>,
    /// Raw text of the last payload applied to the snapshot.
    ///
    /// Malformed and empty payloads leave it untouched.
    pub last_message: Option<String>,
}

impl FeedState {
    /// Vehicles sorted by identifier.
    #[must_use]
    pub fn vehicles_by_id(&self) -> Vec<Vehicle> {
        self.vehicles.sorted_by_id().into_iter().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names() {
        assert_eq!(ConnectionStatus::Disconnected.as_str(), "disconnected");
        assert_eq!(ConnectionStatus::Connecting.as_str(), "connecting");
        assert_eq!(ConnectionStatus::Connected.as_str(), "connected");
        assert_eq!(ConnectionStatus::Connecting.label(), "Connecting...");
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn status_serialization() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Connected).unwrap(),
            "\"connected\""
        );
    }

    #[test]
    fn error_messages_distinguish_closure_from_fault() {
        let closed = FeedError::ClosedAbnormally { code: 1006 };
        let fault = FeedError::Transport("reset by peer".to_string());

        assert_eq!(closed.to_string(), "connection closed abnormally (code 1006)");
        assert_eq!(fault.to_string(), "transport error occurred: reset by peer");
        assert_eq!(closed.kind(), "closed_abnormally");
        assert_eq!(fault.kind(), "transport");
    }

    #[test]
    fn default_state_is_empty_and_disconnected() {
        let state = FeedState::default();
        assert!(state.vehicles.is_empty());
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.error.is_none());
        assert!(state.last_message.is_none());
        assert!(state.vehicles_by_id().is_empty());
    }
}
