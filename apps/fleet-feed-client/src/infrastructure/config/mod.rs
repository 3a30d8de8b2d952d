//! Configuration Module
//!
//! Configuration loading for the feed client service.

mod settings;

pub use settings::{ConfigError, DEFAULT_FEED_URL, FeedConfig, ReconnectSettings, ServerSettings};
