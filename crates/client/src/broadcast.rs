//! Cross-tab signaling without a server round-trip.
//!
//! Sibling contexts of one session share a key-value store with change
//! notification. Publishing writes a [`BroadcastEvent`] under one fixed key
//! and clears the key again: the change notification fires in *other*
//! contexts on every write, and clearing prevents a context that re-attaches
//! its listener later from replaying a stale value. Two contract notes every
//! backend must honor:
//!
//! 1. a publisher never observes its own event (enforced here by origin-id
//!    filtering, whatever the backend does);
//! 2. only a value *change* triggers delivery, which is exactly why publish
//!    pairs the write with a clear.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pressroom_shared::{BroadcastEvent, BroadcastKind};

/// The single fixed key all notification broadcasts go through.
pub const BROADCAST_KEY: &str = "pressroom.notifications.broadcast";

/// Shared origin storage with change notification.
pub trait SharedStorage: Send + Sync {
    /// Write `value` under `key`. Returns false if the backend refused.
    fn set(&self, key: &str, value: &str) -> bool;
    fn get(&self, key: &str) -> Option<String>;
    fn remove(&self, key: &str);
    /// Values written to `key` by any context, delivered on change only.
    fn watch(&self, key: &str) -> mpsc::UnboundedReceiver<String>;
    /// How long a published value must stay readable before it may be
    /// cleared. Push-style backends return zero; polling backends need the
    /// value to survive one poll interval.
    fn linger(&self) -> Duration {
        Duration::ZERO
    }
}

// --- In-memory backend ---

#[derive(Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
}

/// In-process backend. Delivery is push-style (no polling), so the
/// broadcast key can be cleared in the same tick. Clones share state,
/// which is how tests model several tabs of one session.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> bool {
        let mut inner = self.inner.lock().expect("storage lock poisoned");
        let changed = inner.values.get(key).map(String::as_str) != Some(value);
        inner.values.insert(key.to_string(), value.to_string());
        if changed {
            if let Some(watchers) = inner.watchers.get_mut(key) {
                watchers.retain(|tx| tx.send(value.to_string()).is_ok());
            }
        }
        true
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .expect("storage lock poisoned")
            .values
            .get(key)
            .cloned()
    }

    fn remove(&self, key: &str) {
        self.inner
            .lock()
            .expect("storage lock poisoned")
            .values
            .remove(key);
    }

    fn watch(&self, key: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("storage lock poisoned")
            .watchers
            .entry(key.to_string())
            .or_default()
            .push(tx);
        rx
    }
}

// --- File backend ---

/// Cross-process backend: one JSON file per key under the platform config
/// directory, watched by polling. Because the watcher polls, published
/// values linger for [`FileStorage::LINGER`] before the broadcaster clears
/// them.
pub struct FileStorage {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileStorage {
    const LINGER: Duration = Duration::from_millis(500);
    const POLL_INTERVAL: Duration = Duration::from_millis(250);

    /// Storage rooted at `{config_dir}/{app}` (created on demand).
    pub fn new(app: &str) -> Option<Self> {
        let dir = dirs::config_dir()?.join(app);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).ok()?;
        }
        Some(Self {
            dir,
            poll_interval: Self::POLL_INTERVAL,
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{safe_key}.json"))
    }
}

impl SharedStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> bool {
        std::fs::write(self.path_for(key), value).is_ok()
    }

    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }

    fn watch(&self, key: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let path = self.path_for(key);
        let interval = self.poll_interval;
        tokio::spawn(async move {
            let mut last_seen: Option<String> = None;
            loop {
                tokio::time::sleep(interval).await;
                let current = std::fs::read_to_string(&path).ok();
                match current {
                    Some(value) if last_seen.as_deref() != Some(&value) => {
                        if tx.send(value.clone()).is_err() {
                            break;
                        }
                        last_seen = Some(value);
                    }
                    Some(_) => {}
                    // Cleared: forget the last value so a rewrite of the
                    // same content still counts as a change.
                    None => last_seen = None,
                }
            }
        });
        rx
    }

    fn linger(&self) -> Duration {
        Self::LINGER
    }
}

// --- Broadcaster ---

/// Publishes and receives [`BroadcastEvent`]s for one browsing context.
#[derive(Clone)]
pub struct TabBroadcaster {
    storage: Arc<dyn SharedStorage>,
    origin: String,
}

impl TabBroadcaster {
    pub fn new(storage: Arc<dyn SharedStorage>) -> Self {
        Self {
            storage,
            origin: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Identity of this context; events it publishes carry it.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Write an event under the broadcast key, then clear the key.
    pub fn publish(&self, kind: BroadcastKind, data: serde_json::Value) {
        let event = BroadcastEvent::new(kind, data, self.origin.clone());
        let raw = match serde_json::to_string(&event) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("failed to encode broadcast event: {e}");
                return;
            }
        };
        if !self.storage.set(BROADCAST_KEY, &raw) {
            tracing::warn!("shared storage refused broadcast write");
            return;
        }
        let linger = self.storage.linger();
        if linger.is_zero() {
            self.storage.remove(BROADCAST_KEY);
        } else {
            // Clear after the backend's linger window, and only if no one
            // published something newer in the meantime.
            let storage = self.storage.clone();
            tokio::spawn(async move {
                tokio::time::sleep(linger).await;
                if storage.get(BROADCAST_KEY).as_deref() == Some(raw.as_str()) {
                    storage.remove(BROADCAST_KEY);
                }
            });
        }
    }

    /// Listen for events from *other* contexts. Own events are filtered
    /// out by origin id. Dropping the returned handle stops the listener.
    pub fn subscribe(
        &self,
        handler: impl Fn(BroadcastEvent) + Send + Sync + 'static,
    ) -> BroadcastSubscription {
        let mut rx = self.storage.watch(BROADCAST_KEY);
        let own_origin = self.origin.clone();
        let task = tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                let event: BroadcastEvent = match serde_json::from_str(&raw) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!("dropping undecodable broadcast event: {e}");
                        continue;
                    }
                };
                if event.origin == own_origin {
                    continue;
                }
                handler(event);
            }
        });
        BroadcastSubscription { task }
    }
}

/// Keeps a broadcast listener alive; aborts it on drop.
pub struct BroadcastSubscription {
    task: JoinHandle<()>,
}

impl Drop for BroadcastSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn publisher_never_sees_its_own_event() {
        let storage = Arc::new(MemoryStorage::new());
        let publisher = TabBroadcaster::new(storage.clone() as Arc<dyn SharedStorage>);
        let own_hits = Arc::new(AtomicUsize::new(0));

        let hits = own_hits.clone();
        let _sub = publisher.subscribe(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        settle().await;

        publisher.publish(BroadcastKind::AllRead, serde_json::Value::Null);
        settle().await;
        assert_eq!(own_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_context_receives_and_key_is_cleared() {
        let storage = Arc::new(MemoryStorage::new());
        let tab_a = TabBroadcaster::new(storage.clone() as Arc<dyn SharedStorage>);
        let tab_b = TabBroadcaster::new(storage.clone() as Arc<dyn SharedStorage>);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = tab_b.subscribe(move |event| {
            sink.lock().unwrap().push(event.kind);
        });
        settle().await;

        tab_a.publish(
            BroadcastKind::ItemRead,
            serde_json::json!({ "id": 42 }),
        );
        settle().await;

        assert_eq!(seen.lock().unwrap().as_slice(), &[BroadcastKind::ItemRead]);
        // write-then-clear: a listener attaching late must find nothing
        assert_eq!(storage.get(BROADCAST_KEY), None);
    }

    #[tokio::test]
    async fn repeated_identical_events_still_deliver() {
        // Clearing between publishes is what makes the second identical
        // write register as a change.
        let storage = Arc::new(MemoryStorage::new());
        let tab_a = TabBroadcaster::new(storage.clone() as Arc<dyn SharedStorage>);
        let tab_b = TabBroadcaster::new(storage as Arc<dyn SharedStorage>);

        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();
        let _sub = tab_b.subscribe(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        settle().await;

        // identical payloads (timestamps pinned by reusing the raw value is
        // not possible through publish, so compare via kind-only payloads)
        tab_a.publish(BroadcastKind::AllRead, serde_json::Value::Null);
        settle().await;
        tab_a.publish(BroadcastKind::AllRead, serde_json::Value::Null);
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
