//! Wire protocol for the notification socket.
//!
//! Frames are JSON objects discriminated by a `type` field. Inbound frames
//! the client does not recognize deserialize as `Unknown` and are ignored,
//! never treated as errors.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::NotificationItem;

/// Current time as epoch milliseconds, the timestamp unit used on the wire.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Frames the server pushes to the client.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A freshly created notification for the current user.
    Notification { data: NotificationItem },
    /// Heartbeat reply; consumed by the connection layer, never fanned out.
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Echo confirming a read transition was persisted server-side.
    ReadReceipt {
        #[serde(default)]
        id: Option<i64>,
    },
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    pub fn is_pong(&self) -> bool {
        matches!(self, ServerFrame::Pong { .. })
    }
}

/// Frames the client sends to the server.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keep-alive probe, sent on a fixed interval while connected.
    Ping { timestamp: i64 },
}

impl ClientFrame {
    pub fn ping() -> Self {
        ClientFrame::Ping {
            timestamp: epoch_millis(),
        }
    }
}
