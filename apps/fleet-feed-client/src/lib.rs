#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Fleet Feed Client - Live Vehicle Position Tracking
//!
//! Maintains a single streaming connection to a vehicle position feed,
//! keeps the latest known state of every vehicle, and pushes each change to
//! registered subscribers. Dropped connections are retried with capped
//! exponential backoff.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Vehicle snapshot and connection state types
//!   - `vehicle`: Wire records, vehicles, the fleet snapshot
//!   - `connection`: Connection status, errors, published state
//!
//! - **Application**: Port definitions
//!   - `ports`: Streaming transport interface
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Feed client, codec, backoff, WebSocket transport
//!   - `broadcast`: Ordered subscriber notification
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing subscriber setup
//!
//! # Data Flow
//!
//! ```text
//! Feed WS ──► Transport ──► FeedClient ──► Notifier ──► Subscriber 1
//!                           (snapshot)                ├► Subscriber 2
//!                                                     └► Subscriber N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Vehicle and connection types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ABNORMAL_CLOSURE_CODE, ConnectionStatus, FeedError, FeedState};
pub use domain::vehicle::{Fleet, Vehicle, VehicleId, VehicleUpdate};

// Ports
pub use application::ports::{
    CloseFrame, Transport, TransportError, TransportEvent, TransportStream,
};

// Feed client
pub use infrastructure::feed::{
    CodecError, FeedClient, FeedClientConfig, JsonCodec, ReconnectConfig, ReconnectPolicy,
    Subscription, WebSocketTransport,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FeedConfig, ReconnectSettings, ServerSettings};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
