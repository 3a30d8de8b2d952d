//! Fleet Feed Client Binary
//!
//! Connects to the vehicle position feed and keeps a live fleet snapshot.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin fleet-feed-client
//! ```
//!
//! # Environment Variables
//!
//! - `FLEET_FEED_URL`: Feed endpoint (default: `ws://localhost:8000/ws/bus/`)
//! - `FLEET_FEED_RECONNECT_BASE_MS`: Backoff base delay (default: 1000)
//! - `FLEET_FEED_RECONNECT_MAX_SECS`: Backoff cap (default: 30)
//! - `FLEET_FEED_RECONNECT_MULTIPLIER`: Backoff growth (default: 2.0)
//! - `FLEET_FEED_RECONNECT_JITTER`: Jitter fraction (default: 0.0)
//! - `FLEET_FEED_MAX_RECONNECT_ATTEMPTS`: Retry budget, 0 = unlimited (default: 5)
//! - `FLEET_FEED_HEALTH_PORT`: Health check HTTP port, 0 = disabled (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: fleet-feed-client)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use fleet_feed_client::infrastructure::health::{HealthServer, HealthServerState};
use fleet_feed_client::infrastructure::telemetry;
use fleet_feed_client::{
    ConnectionStatus, FeedClient, FeedClientConfig, FeedConfig, ReconnectConfig, init_metrics,
};
use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Fleet Feed Client");

    let _metrics_handle = init_metrics();

    let config = FeedConfig::from_env().context("invalid feed configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let client = FeedClient::websocket(
        FeedClientConfig::new(config.endpoint.clone())
            .with_reconnect(ReconnectConfig::from_settings(&config.reconnect)),
    );

    let subscription = client.subscribe(status_logger());

    if config.health_enabled() {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            client.clone(),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );

        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    client.connect();

    tracing::info!("Fleet feed client ready");

    await_shutdown(shutdown_token).await;

    subscription.unsubscribe();
    client.disconnect();

    tracing::info!("Fleet feed client stopped");
    Ok(())
}

/// Log connection transitions and fleet size changes.
fn status_logger() -> impl Fn(&fleet_feed_client::FeedState) + Send + Sync + 'static {
    let last = Mutex::new((ConnectionStatus::Disconnected, 0usize));

    move |state| {
        let mut last = last.lock();
        let vehicles = state.vehicles.len();

        if last.0 != state.status {
            match &state.error {
                Some(error) => {
                    tracing::warn!(status = state.status.label(), error = %error, "Feed status changed");
                }
                None => tracing::info!(status = state.status.label(), "Feed status changed"),
            }
        }

        if last.1 != vehicles {
            tracing::debug!(vehicles, "Fleet size changed");
        }

        *last = (state.status, vehicles);
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        endpoint = %config.endpoint,
        health_port = config.server.health_port,
        max_reconnect_attempts = config.reconnect.max_attempts,
        "Configuration loaded"
    );
    tracing::debug!(
        delay_initial_ms = config.reconnect.delay_initial.as_millis(),
        delay_max_secs = config.reconnect.delay_max.as_secs(),
        multiplier = config.reconnect.delay_multiplier,
        jitter = config.reconnect.jitter_factor,
        "Reconnect backoff"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
