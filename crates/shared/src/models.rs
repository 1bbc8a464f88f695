//! Shared data models for the pressroom notification system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Notifications ---

/// Category of a notification event.
///
/// Servers add categories over time; anything this build does not know yet
/// deserializes as `Other` instead of failing the whole payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Comment,
    Reply,
    Like,
    Follow,
    System,
    #[serde(other)]
    Other,
}

/// The user a notification originated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderRef {
    pub id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Reference to the content a notification is about (an article, a comment).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedContent {
    #[serde(rename = "type")]
    pub r#type: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A single notification as the server defines it.
///
/// Immutable except for `is_read`, which only ever transitions false → true.
/// `id` is absent for events pushed before the server persisted them; such
/// items are matched by content + sender + timestamp proximity instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sender: SenderRef,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedContent>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// --- REST surface ---

/// Query for the paginated history read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NotificationKind>,
}

/// One page of notification history, with the server-authoritative totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPage {
    pub list: Vec<NotificationItem>,
    pub total: u64,
    pub unread_count: u64,
}

/// Lightweight unread-count response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreadCount {
    pub unread_count: u64,
}

/// Success/failure discriminator returned by the mutation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
