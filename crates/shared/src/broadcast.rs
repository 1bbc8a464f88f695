//! Cross-tab broadcast event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of state change a broadcast announces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    NewItem,
    ItemRead,
    AllRead,
}

/// Ephemeral event written to shared origin storage to nudge sibling
/// browsing contexts of the same session.
///
/// It has no persistent identity: the publisher writes it under a fixed key
/// and clears the key again, so it only exists long enough to fire a change
/// notification elsewhere. `origin` identifies the publishing context so a
/// publisher can filter out its own events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastEvent {
    pub kind: BroadcastKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub origin: String,
}

impl BroadcastEvent {
    pub fn new(kind: BroadcastKind, data: serde_json::Value, origin: impl Into<String>) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
            origin: origin.into(),
        }
    }
}
