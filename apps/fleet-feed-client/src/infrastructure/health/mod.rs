//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, Prometheus
//! metrics, and a read-only view of the tracked fleet.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (feed connected)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /vehicles` - Current vehicles as JSON, sorted by id

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::connection::{ConnectionStatus, FeedState};
use crate::domain::vehicle::Vehicle;
use crate::infrastructure::feed::FeedClient;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Client version.
    pub version: String,
    /// Process uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed connection status.
    pub feed: FeedInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed connected.
    Healthy,
    /// Feed connection in progress.
    Degraded,
    /// Feed disconnected.
    Unhealthy,
}

/// Feed connection details.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Feed endpoint.
    pub endpoint: String,
    /// Connection state.
    pub state: ConnectionStatus,
    /// Whether the feed is connected.
    pub connected: bool,
    /// Most recent connection error, if any.
    pub last_error: Option<String>,
    /// Reconnect attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Number of tracked vehicles.
    pub vehicles: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    client: FeedClient,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, client: FeedClient) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            client,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError::ServerFailed` if the HTTP server fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        let port = listener.local_addr().map_or(self.port, |addr| addr.port());
        tracing::info!(port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/vehicles", get(vehicles_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.client.status().is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

async fn vehicles_handler(State(state): State<Arc<HealthServerState>>) -> Json<Vec<Vehicle>> {
    Json(state.client.state().vehicles_by_id())
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = feed_info(
        state.client.endpoint(),
        &state.client.state(),
        state.client.reconnect_attempts(),
    );

    HealthResponse {
        status: determine_health_status(feed.state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
    }
}

fn feed_info(endpoint: &str, state: &FeedState, reconnect_attempts: u32) -> FeedInfo {
    FeedInfo {
        endpoint: endpoint.to_string(),
        state: state.status,
        connected: state.status.is_connected(),
        last_error: state.error.as_ref().map(ToString::to_string),
        reconnect_attempts,
        vehicles: state.vehicles.len(),
    }
}

const fn determine_health_status(status: ConnectionStatus) -> HealthStatus {
    match status {
        ConnectionStatus::Connected => HealthStatus::Healthy,
        ConnectionStatus::Connecting => HealthStatus::Degraded,
        ConnectionStatus::Disconnected => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::connection::FeedError;
    use crate::infrastructure::feed::FeedClientConfig;

    fn test_state() -> Arc<HealthServerState> {
        let client = FeedClient::websocket(FeedClientConfig::new("ws://127.0.0.1:1/ws/bus/"));
        Arc::new(HealthServerState::new("0.1.0-test".to_string(), client))
    }

    async fn fetch(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_connection() {
        assert_eq!(
            determine_health_status(ConnectionStatus::Connected),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(ConnectionStatus::Connecting),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(ConnectionStatus::Disconnected),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn feed_info_reports_error_text() {
        let state = FeedState {
            status: ConnectionStatus::Disconnected,
            error: Some(FeedError::ClosedAbnormally { code: 1006 }),
            ..FeedState::default()
        };

        let info = feed_info("ws://feed", &state, 3);
        assert!(!info.connected);
        assert_eq!(info.reconnect_attempts, 3);
        assert_eq!(info.vehicles, 0);
        assert_eq!(
            info.last_error.as_deref(),
            Some("connection closed abnormally (code 1006)")
        );
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = fetch(router(test_state()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn not_ready_while_disconnected() {
        let (status, _) = fetch(router(test_state()), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_reports_disconnected_feed() {
        let (status, body) = fetch(router(test_state()), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["version"], "0.1.0-test");
        assert_eq!(json["feed"]["state"], "disconnected");
        assert_eq!(json["feed"]["vehicles"], 0);
        assert!(json["feed"]["last_error"].is_null());
    }

    #[tokio::test]
    async fn vehicles_empty_before_any_payload() {
        let (status, body) = fetch(router(test_state()), "/vehicles").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!([]));
    }
}
