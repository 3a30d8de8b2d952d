//! Fleet Feed Client
//!
//! Maintains one streaming connection to the vehicle position feed, keeps
//! the latest state per vehicle, and publishes every change to subscribers.
//!
//! # State Machine
//!
//! ```text
//!                connect()
//!  Disconnected ───────────► Connecting ──open──► Connected
//!       ▲                        │                    │
//!       └──── failure / disconnect() ─────────────────┘
//! ```
//!
//! # Concurrency
//!
//! All mutable state lives behind one mutex. Each connection attempt gets a
//! new generation number; transport events and retry timers carry the
//! generation they were started with and are ignored once it is stale, so a
//! timer that fires after `connect()`/`disconnect()` cannot act.
//!
//! Callbacks never run under the state lock (see
//! [`Notifier`](crate::infrastructure::broadcast::Notifier)).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::websocket::WebSocketTransport;
use crate::application::ports::{CloseFrame, Transport, TransportEvent};
use crate::domain::connection::{ConnectionStatus, FeedError, FeedState};
use crate::infrastructure::broadcast::{Callback, Notifier, SubscriberId};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Feed endpoint address.
    pub endpoint: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl FeedClientConfig {
    /// Create a configuration with default reconnect behavior.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Override the reconnect configuration.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// =============================================================================
// Internal State
// =============================================================================

struct ClientState {
    published: FeedState,
    version: u64,
    generation: u64,
    reconnect: ReconnectPolicy,
    connection: Option<CancellationToken>,
    retry: Option<CancellationToken>,
}

struct Inner {
    config: FeedClientConfig,
    transport: Arc<dyn Transport>,
    codec: JsonCodec,
    state: Mutex<ClientState>,
    notifier: Notifier,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(token) = state.connection.take() {
            token.cancel();
        }
        if let Some(token) = state.retry.take() {
            token.cancel();
        }
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// Resilient client for the vehicle position feed.
///
/// Cheap to clone; all clones share one connection and one snapshot.
/// Background tasks are cancelled once the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use fleet_feed_client::{FeedClient, FeedClientConfig};
///
/// # #[tokio::main]
/// # async fn main() {
/// let client = FeedClient::websocket(FeedClientConfig::new("ws://localhost:8000/ws/bus/"));
///
/// let subscription = client.subscribe(|state| {
///     println!("{} vehicles, {}", state.vehicles.len(), state.status);
/// });
///
/// client.connect();
/// // ...
/// subscription.unsubscribe();
/// client.disconnect();
/// # }
/// ```
#[derive(Clone)]
pub struct FeedClient {
    inner: Arc<Inner>,
}

impl FeedClient {
    /// Create a client over the given transport.
    #[must_use]
    pub fn new<T: Transport>(config: FeedClientConfig, transport: T) -> Self {
        Self::with_shared_transport(config, Arc::new(transport))
    }

    /// Create a client over a shared transport.
    #[must_use]
    pub fn with_shared_transport(config: FeedClientConfig, transport: Arc<dyn Transport>) -> Self {
        let reconnect = ReconnectPolicy::new(config.reconnect.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                codec: JsonCodec::new(),
                state: Mutex::new(ClientState {
                    published: FeedState::default(),
                    version: 0,
                    generation: 0,
                    reconnect,
                    connection: None,
                    retry: None,
                }),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Create a client over a WebSocket transport.
    #[must_use]
    pub fn websocket(config: FeedClientConfig) -> Self {
        Self::new(config, WebSocketTransport::new())
    }

    /// Start connecting, tearing down any existing connection or pending retry.
    ///
    /// Returns immediately; the outcome is published to subscribers. A manual
    /// call starts a fresh reconnect budget.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(&self) {
        let mut state = self.inner.state.lock();
        state.reconnect.reset();
        self.inner.begin_attempt(&mut state);
        drop(state);
        self.inner.notifier.drain();
    }

    /// Stop the connection and cancel any pending reconnect.
    ///
    /// Transport events arriving after this returns are ignored. Calling it
    /// again while already disconnected publishes nothing.
    pub fn disconnect(&self) {
        let mut state = self.inner.state.lock();
        self.inner.teardown(&mut state);
        state.reconnect.reset();

        let changed = state.published.status != ConnectionStatus::Disconnected
            || state.published.error.is_some();

        if changed {
            tracing::info!(endpoint = %self.inner.config.endpoint, "Disconnecting from fleet feed");
            state.published.status = ConnectionStatus::Disconnected;
            state.published.error = None;
            self.inner.publish(&mut state);
        }

        drop(state);
        self.inner.notifier.drain();
    }

    /// Register a callback for every state change.
    ///
    /// The callback is invoked first with the current state, then with every
    /// later one. The first call happens before this returns unless states
    /// are already being delivered (from another thread, or because this is
    /// called from inside a callback); then the running delivery makes it,
    /// still ahead of any newer state.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&FeedState) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);

        let (id, active) = {
            let state = self.inner.state.lock();
            let (id, active) = self.inner.notifier.register(state.version, callback);
            self.inner
                .notifier
                .enqueue_for(id, state.version, state.published.clone());
            (id, active)
        };

        self.inner.notifier.drain();

        Subscription {
            id,
            active,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Current state without subscribing.
    #[must_use]
    pub fn state(&self) -> FeedState {
        self.inner.state.lock().published.clone()
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.lock().published.status
    }

    /// Reconnect attempts used since the last successful connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.lock().reconnect.attempt_count()
    }

    /// Whether a reconnect timer is pending.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.state.lock().retry.is_some()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.subscriber_count()
    }

    /// Configured feed endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.config.endpoint
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("endpoint", &self.inner.config.endpoint)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Handle returned by [`FeedClient::subscribe`].
///
/// Dropping the handle does not unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriberId,
    active: Arc<AtomicBool>,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Stop receiving states. Safe to call repeatedly and from a callback.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
        if let Some(inner) = self.inner.upgrade() {
            inner.notifier.unregister(self.id);
        }
    }

    /// Whether the subscription still receives states.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// State Transitions
// =============================================================================

impl Inner {
    /// Queue the current state for delivery.
    fn publish(&self, state: &mut ClientState) {
        state.version += 1;
        metrics::set_connection_status(state.published.status);
        self.notifier.enqueue(state.version, state.published.clone());
    }

    /// Invalidate the current generation and cancel its tasks.
    fn teardown(&self, state: &mut ClientState) {
        state.generation += 1;
        if let Some(token) = state.connection.take() {
            token.cancel();
        }
        if let Some(token) = state.retry.take() {
            token.cancel();
        }
    }

    fn begin_attempt(self: &Arc<Self>, state: &mut ClientState) {
        self.teardown(state);
        let generation = state.generation;

        state.published.status = ConnectionStatus::Connecting;
        state.published.error = None;
        self.publish(state);

        tracing::info!(
            endpoint = %self.config.endpoint,
            generation,
            "Connecting to fleet feed"
        );

        match self.transport.prepare(&self.config.endpoint) {
            Ok(()) => {
                let cancel = CancellationToken::new();
                state.connection = Some(cancel.clone());
                tokio::spawn(run_connection(Arc::downgrade(self), generation, cancel));
            }
            Err(e) => {
                let error = FeedError::OpenFailed(e.to_string());
                tracing::warn!(error = %error, "Fleet feed endpoint rejected");
                metrics::record_connection_error(error.kind());

                state.published.status = ConnectionStatus::Disconnected;
                state.published.error = Some(error);
                self.publish(state);
                self.schedule_reconnect(state);
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ClientState) {
        if let Some(token) = state.retry.take() {
            token.cancel();
        }

        let Some(delay) = state.reconnect.next_delay() else {
            tracing::warn!(
                attempts = state.reconnect.attempt_count(),
                "Reconnect attempts exhausted, staying disconnected"
            );
            return;
        };

        let attempt = state.reconnect.attempt_count();
        let generation = state.generation;
        metrics::record_reconnect();
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis(),
            "Scheduling fleet feed reconnect"
        );

        let cancel = CancellationToken::new();
        state.retry = Some(cancel.clone());
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_retry(generation);
                    }
                }
            }
        });
    }

    fn fire_retry(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(generation, "Ignoring stale reconnect timer");
            return;
        }

        state.retry = None;
        self.begin_attempt(&mut state);
        drop(state);
        self.notifier.drain();
    }

    fn on_open(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }

        tracing::info!(endpoint = %self.config.endpoint, "Fleet feed connected");
        state.published.status = ConnectionStatus::Connected;
        state.published.error = None;
        state.reconnect.reset();
        self.publish(&mut state);

        drop(state);
        self.notifier.drain();
        true
    }

    fn on_message(&self, generation: u64, text: &str) {
        if self.state.lock().generation != generation {
            return;
        }
        metrics::record_payload_received();

        let updates = match self.codec.decode(text) {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed feed payload");
                metrics::record_decode_failure();
                return;
            }
        };

        if updates.is_empty() {
            tracing::trace!("Ignoring empty feed payload");
            return;
        }

        // Torn down while decoding.
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }

        let fleet = Arc::make_mut(&mut state.published.vehicles);
        let applied = fleet.apply(updates, Utc::now());
        let tracked = fleet.len();
        state.published.last_message = Some(text.to_string());

        tracing::debug!(applied, tracked, "Applied vehicle updates");
        metrics::record_vehicle_updates(applied as u64);
        metrics::set_tracked_vehicles(tracked);
        self.publish(&mut state);

        drop(state);
        self.notifier.drain();
    }

    fn on_error(&self, generation: u64, message: String) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }

        let error = FeedError::Transport(message);
        tracing::warn!(error = %error, "Fleet feed transport error");
        metrics::record_connection_error(error.kind());

        state.published.status = ConnectionStatus::Disconnected;
        state.published.error = Some(error);
        self.publish(&mut state);

        drop(state);
        self.notifier.drain();
    }

    fn on_close(self: &Arc<Self>, generation: u64, frame: CloseFrame) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }

        state.connection = None;
        state.published.status = ConnectionStatus::Disconnected;

        if frame.was_clean {
            tracing::info!(code = frame.code, "Fleet feed closed cleanly");
            state.published.error = None;
            self.publish(&mut state);
        } else {
            let error = FeedError::ClosedAbnormally { code: frame.code };
            tracing::warn!(error = %error, "Fleet feed connection lost");
            metrics::record_connection_error(error.kind());

            state.published.error = Some(error);
            self.publish(&mut state);
            self.schedule_reconnect(&mut state);
        }

        drop(state);
        self.notifier.drain();
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// Drive one connection attempt until it closes or is cancelled.
async fn run_connection(weak: Weak<Inner>, generation: u64, cancel: CancellationToken) {
    let Some((transport, endpoint)) = weak
        .upgrade()
        .map(|inner| (Arc::clone(&inner.transport), inner.config.endpoint.clone()))
    else {
        return;
    };

    let opened = tokio::select! {
        () = cancel.cancelled() => return,
        opened = transport.open(&endpoint) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            if let Some(inner) = weak.upgrade() {
                inner.on_error(generation, e.to_string());
                inner.on_close(generation, CloseFrame::abnormal());
            }
            return;
        }
    };

    let is_current = weak
        .upgrade()
        .is_some_and(|inner| inner.on_open(generation));
    if !is_current {
        stream.close().await;
        return;
    }

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stream.close().await;
                return;
            }
            event = stream.next_event() => event,
        };

        let Some(inner) = weak.upgrade() else {
            stream.close().await;
            return;
        };

        match event {
            Some(TransportEvent::Message(text)) => inner.on_message(generation, &text),
            Some(TransportEvent::Error(message)) => inner.on_error(generation, message),
            Some(TransportEvent::Closed(frame)) => {
                inner.on_close(generation, frame);
                return;
            }
            None => {
                inner.on_close(generation, CloseFrame::abnormal());
                return;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
