//! Session-scoped state stores.

mod notifications;

pub use notifications::{NotificationSnapshot, NotificationStore};
