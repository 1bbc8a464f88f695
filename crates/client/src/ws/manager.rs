//! Connection registry shared by every consumer.
//!
//! `SocketManager` is cheap to clone and hand to any number of consumers
//! (bell widget, notifications page, diagnostics view). It guarantees at
//! most one live connection per endpoint URL: all callers funnel through
//! the same per-URL actor, and a `connect` while that actor is already
//! connecting or connected is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};

use pressroom_shared::ServerFrame;

use super::connection::{Command, ConnectionActor};
use super::{MessageCallback, OutboundMessage, StatusCallback, StatusUpdate, WsConfig};
use crate::credentials::CredentialProvider;

struct Entry {
    tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<StatusUpdate>,
}

struct Inner {
    config: WsConfig,
    credentials: Arc<dyn CredentialProvider>,
    connections: Mutex<HashMap<String, Entry>>,
    next_subscriber: AtomicU64,
}

/// Manages one WebSocket connection per endpoint URL.
#[derive(Clone)]
pub struct SocketManager {
    inner: Arc<Inner>,
}

impl SocketManager {
    pub fn new(credentials: Arc<dyn CredentialProvider>, config: WsConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                credentials,
                connections: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    /// Open the connection for `url` (idempotent). Returns immediately;
    /// progress is observable through status callbacks or [`Self::status`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, url: &str) {
        self.with_entry(url, |entry| {
            let _ = entry.tx.send(Command::Connect);
        });
    }

    /// Close the connection for `url` and suppress automatic reconnection
    /// until `connect`/`reconnect` is called again. Safe from any state.
    pub fn disconnect(&self, url: &str) {
        let connections = self.registry();
        if let Some(entry) = connections.get(url) {
            let _ = entry.tx.send(Command::Disconnect);
        }
    }

    /// Reset the retry counter and connect: the recovery path out of a
    /// failed state the automatic policy gave up on.
    pub fn reconnect(&self, url: &str) {
        self.with_entry(url, |entry| {
            let _ = entry.tx.send(Command::Reconnect);
        });
    }

    /// Send a payload if (and only if) the connection is currently open.
    /// Returns `false` otherwise; callers must check, nothing is queued.
    pub async fn send(&self, url: &str, payload: OutboundMessage) -> bool {
        let tx = {
            let connections = self.registry();
            match connections.get(url) {
                Some(entry) => entry.tx.clone(),
                None => return false,
            }
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(Command::Send(payload, reply_tx)).is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Register callbacks for inbound frames and/or status transitions.
    ///
    /// Registering never opens the connection by itself; pair with
    /// [`Self::connect`] if that is wanted. Dropping the returned handle
    /// removes the callbacks but never closes the shared connection.
    pub fn subscribe(
        &self,
        url: &str,
        on_message: Option<MessageCallback>,
        on_status: Option<StatusCallback>,
    ) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let tx = self.with_entry(url, |entry| entry.tx.clone());
        let _ = tx.send(Command::Subscribe {
            id,
            on_message,
            on_status,
        });
        Subscription {
            url: url.to_string(),
            id,
            tx,
        }
    }

    /// Convenience wrapper for message-only subscribers.
    pub fn subscribe_messages(
        &self,
        url: &str,
        on_message: impl Fn(&ServerFrame) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(url, Some(Arc::new(on_message)), None)
    }

    /// Current status for `url` (`Disconnected` if never touched).
    pub fn status(&self, url: &str) -> StatusUpdate {
        let connections = self.registry();
        connections
            .get(url)
            .map(|entry| entry.status_rx.borrow().clone())
            .unwrap_or_default()
    }

    /// Watch status transitions for `url`. Creates the (disconnected)
    /// connection state if it does not exist yet.
    pub fn watch_status(&self, url: &str) -> watch::Receiver<StatusUpdate> {
        self.with_entry(url, |entry| entry.status_rx.clone())
    }

    /// Status of every known endpoint, for the diagnostics view.
    pub fn statuses(&self) -> Vec<(String, StatusUpdate)> {
        let connections = self.registry();
        connections
            .iter()
            .map(|(url, entry)| (url.clone(), entry.status_rx.borrow().clone()))
            .collect()
    }

    /// Disconnect everything and clear the registry (logout path).
    pub fn shutdown(&self) {
        let mut connections = self.registry();
        for entry in connections.values() {
            let _ = entry.tx.send(Command::Disconnect);
        }
        connections.clear();
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // Entry bodies never panic while holding the lock.
        self.inner.connections.lock().expect("connection registry poisoned")
    }

    /// Look up the entry for `url`, creating its actor lazily.
    fn with_entry<T>(&self, url: &str, f: impl FnOnce(&Entry) -> T) -> T {
        let mut connections = self.registry();
        let entry = connections.entry(url.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let (status_tx, status_rx) = watch::channel(StatusUpdate::default());
            let actor = ConnectionActor::new(
                url.to_string(),
                self.inner.config.clone(),
                self.inner.credentials.clone(),
                rx,
                status_tx,
            );
            tokio::spawn(actor.run());
            Entry { tx, status_rx }
        });
        f(entry)
    }
}

/// Handle returned by [`SocketManager::subscribe`]. Dropping it removes the
/// registered callbacks; the underlying connection stays up for the other
/// subscribers.
pub struct Subscription {
    url: String,
    id: u64,
    tx: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Remove the callbacks now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Unsubscribe { id: self.id });
    }
}
