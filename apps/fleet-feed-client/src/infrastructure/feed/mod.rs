//! Fleet Feed Adapters
//!
//! Streaming client for the vehicle position feed:
//!
//! - **Client**: connection lifecycle, snapshot, subscriber fan-out
//! - **Codec**: JSON payload decoding
//! - **Reconnect**: capped exponential backoff
//! - **WebSocket**: `tokio-tungstenite` transport

pub mod client;
pub mod codec;
pub mod reconnect;
pub mod websocket;

pub use client::{FeedClient, FeedClientConfig, Subscription};
pub use codec::{CodecError, JsonCodec};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use websocket::WebSocketTransport;
