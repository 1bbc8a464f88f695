//! Shared types for the pressroom realtime notification layer.
//!
//! Everything the socket protocol and the REST surface agree on lives here:
//! the notification model, the wire frames, the cross-tab broadcast event
//! and the client-side API error type.

pub mod broadcast;
pub mod error;
pub mod models;
pub mod protocol;

pub use broadcast::{BroadcastEvent, BroadcastKind};
pub use error::ApiError;
pub use models::{
    ListQuery, MutationAck, NotificationItem, NotificationKind, NotificationPage, SenderRef,
    UnreadCount,
};
pub use protocol::{epoch_millis, ClientFrame, ServerFrame};
