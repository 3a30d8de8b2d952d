//! Feed Client Configuration Settings
//!
//! Configuration types for the feed client, loaded from environment variables.

use std::time::Duration;

/// Feed endpoint used when `FLEET_FEED_URL` is unset.
pub const DEFAULT_FEED_URL: &str = "ws://localhost:8000/ws/bus/";

/// Reconnection backoff settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Base reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub delay_multiplier: f64,
    /// Jitter fraction applied to each delay (0.0 - 1.0).
    pub jitter_factor: f64,
    /// Maximum automatic reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_secs(1),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete feed client configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Feed endpoint address.
    pub endpoint: String,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_FEED_URL.to_string(),
            reconnect: ReconnectSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `FLEET_FEED_URL` is set but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Unparseable values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `FLEET_FEED_URL` is present but empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = match lookup("FLEET_FEED_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("FLEET_FEED_URL".to_string()));
            }
            Some(url) => url.trim().to_string(),
            None => DEFAULT_FEED_URL.to_string(),
        };

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            delay_initial: parse_duration_millis(
                &lookup,
                "FLEET_FEED_RECONNECT_BASE_MS",
                defaults.delay_initial,
            ),
            delay_max: parse_duration_secs(
                &lookup,
                "FLEET_FEED_RECONNECT_MAX_SECS",
                defaults.delay_max,
            ),
            delay_multiplier: parse_or(
                &lookup,
                "FLEET_FEED_RECONNECT_MULTIPLIER",
                defaults.delay_multiplier,
            ),
            jitter_factor: parse_fraction(
                &lookup,
                "FLEET_FEED_RECONNECT_JITTER",
                defaults.jitter_factor,
            ),
            max_attempts: parse_or(
                &lookup,
                "FLEET_FEED_MAX_RECONNECT_ATTEMPTS",
                defaults.max_attempts,
            ),
        };

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "FLEET_FEED_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            endpoint,
            reconnect,
            server,
        })
    }

    /// Whether the health server should be started.
    #[must_use]
    pub const fn health_enabled(&self) -> bool {
        self.server.health_port != 0
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a value in `0.0..=1.0`, clamping finite values and rejecting NaN and infinities.
fn parse_fraction<F>(lookup: &F, key: &str, default: f64) -> f64
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default);
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        default
    }
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
