//! WebSocket connection management with auto-reconnect.
//!
//! One [`SocketManager`] owns a registry of connections keyed by endpoint
//! URL. Each connection is a tokio task that exclusively owns its socket;
//! every state mutation happens inside that task, so there is no locking
//! around connection state and callbacks are never invoked concurrently
//! with themselves.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pressroom_shared::ServerFrame;

mod connection;
mod manager;

pub use manager::{SocketManager, Subscription};

/// Connection state for a WebSocket endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32, max: u32 },
    Failed { reason: String },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting { .. }
        )
    }
}

/// A status change with its human-readable detail, publish time and the
/// retry counter at that moment. What the status indicator renders.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ConnectionStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
}

impl StatusUpdate {
    fn new(status: ConnectionStatus, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: Utc::now(),
            attempts,
        }
    }
}

impl Default for StatusUpdate {
    fn default() -> Self {
        StatusUpdate::new(ConnectionStatus::Disconnected, "not connected", 0)
    }
}

/// Configuration for auto-reconnect behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts before giving up.
    pub max_attempts: u32,
    /// Initial delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry `attempt` (1-based): initial × 2^(attempt-1),
    /// capped at the maximum.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Connection-level tunables.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub reconnect: ReconnectConfig,
    /// How long a connection attempt may take before it counts as failed.
    pub connect_timeout: Duration,
    /// Interval between keep-alive pings while connected.
    pub heartbeat_interval: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

/// Payload for [`SocketManager::send`]: strings pass through unchanged,
/// structured values are JSON-encoded.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Text(String),
    Json(serde_json::Value),
}

impl OutboundMessage {
    pub(crate) fn into_text(self) -> String {
        match self {
            OutboundMessage::Text(s) => s,
            OutboundMessage::Json(v) => v.to_string(),
        }
    }
}

/// Callback invoked for every non-heartbeat inbound frame.
pub type MessageCallback = Arc<dyn Fn(&ServerFrame) + Send + Sync>;
/// Callback invoked on every status transition.
pub type StatusCallback = Arc<dyn Fn(&StatusUpdate) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = ReconnectConfig::default();
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(cfg.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(cfg.delay_for_attempt(5), Duration::from_millis(16_000));
        // capped from here on, and never decreasing
        assert_eq!(cfg.delay_for_attempt(6), Duration::from_millis(30_000));
        assert_eq!(cfg.delay_for_attempt(40), Duration::from_millis(30_000));
    }

    #[test]
    fn backoff_is_monotonic() {
        let cfg = ReconnectConfig {
            max_attempts: 8,
            initial_delay_ms: 250,
            max_delay_ms: 5000,
        };
        let mut last = Duration::ZERO;
        for attempt in 1..=10 {
            let d = cfg.delay_for_attempt(attempt);
            assert!(d >= last, "delay shrank at attempt {attempt}");
            last = d;
        }
    }

    #[test]
    fn status_predicates() {
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(ConnectionStatus::Connecting.is_connecting());
        assert!(ConnectionStatus::Reconnecting { attempt: 1, max: 5 }.is_connecting());
        assert!(!ConnectionStatus::Disconnected.is_connected());
    }
}
