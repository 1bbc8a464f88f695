//! Realtime notification client for the pressroom platform.
//!
//! The crate has two halves:
//!
//! - [`ws`]: a connection manager that keeps exactly one WebSocket per
//!   endpoint URL, fans inbound frames out to any number of subscribers,
//!   and recovers from transport faults with capped exponential backoff.
//! - [`store`]: the notification store that reconciles live pushes with
//!   paginated REST reads into one consistent list + unread count, and
//!   keeps sibling tabs of the same session in sync through [`broadcast`].
//!
//! Page rendering, routing and login flows live elsewhere; this crate only
//! consumes an already-issued access token via [`credentials`].

pub mod api;
pub mod broadcast;
pub mod credentials;
pub mod logging;
pub mod notify;
pub mod store;
pub mod ws;

pub use pressroom_shared as shared;

pub use api::{HttpNotificationApi, NotificationApi};
pub use broadcast::{BroadcastSubscription, FileStorage, MemoryStorage, SharedStorage, TabBroadcaster};
pub use credentials::{CredentialProvider, StaticCredentials};
pub use notify::{DesktopNotification, DesktopNotifier, LogNotifier, NotifierConfig, Permission};
pub use store::{NotificationSnapshot, NotificationStore};
pub use ws::{
    ConnectionStatus, OutboundMessage, ReconnectConfig, SocketManager, StatusUpdate, Subscription,
    WsConfig,
};
