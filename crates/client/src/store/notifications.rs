//! Notification store: the single source of truth for the notification
//! list and unread count of the current session.
//!
//! Three inputs meet here and must stay consistent:
//! - paginated REST reads (authoritative for totals),
//! - live socket pushes (optimistic deltas until the next refresh),
//! - broadcast events from sibling tabs of the same session.
//!
//! Read state is monotonic: `is_read` goes false → true exactly once and
//! no client operation reverts it. The unread count never goes below zero,
//! whatever order deltas arrive in.

use std::sync::{Arc, Mutex};

use pressroom_shared::{
    ApiError, BroadcastEvent, BroadcastKind, ListQuery, NotificationItem, NotificationKind,
    ServerFrame,
};

use crate::api::NotificationApi;
use crate::broadcast::{BroadcastSubscription, TabBroadcaster};
use crate::notify::{DesktopNotification, DesktopNotifier, NotifierConfig, Permission};
use crate::ws::{SocketManager, Subscription};

#[derive(Debug, Default)]
struct StoreState {
    /// Newest first; insertion order is meaningful.
    notifications: Vec<NotificationItem>,
    unread_count: u64,
    total: u64,
    current_page: u32,
    page_size: u32,
}

/// Read-only view handed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSnapshot {
    pub notifications: Vec<NotificationItem>,
    pub unread_count: u64,
    pub total: u64,
    pub current_page: u32,
    pub page_size: u32,
}

/// One instance per session; created on first use, [`reset`](Self::reset)
/// on logout so nothing leaks across user identities.
pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    broadcaster: TabBroadcaster,
    notifier: Arc<dyn DesktopNotifier>,
    notifier_config: NotifierConfig,
    state: Mutex<StoreState>,
}

impl NotificationStore {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        broadcaster: TabBroadcaster,
        notifier: Arc<dyn DesktopNotifier>,
    ) -> Self {
        Self {
            api,
            broadcaster,
            notifier,
            notifier_config: NotifierConfig::default(),
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn with_notifier_config(mut self, config: NotifierConfig) -> Self {
        self.notifier_config = config;
        self
    }

    /// Fetch one page of history. Page 1 (or `refresh`) replaces the list,
    /// later pages append. Server-reported totals overwrite local counts;
    /// this is the reconciliation point for all earlier optimistic deltas.
    /// Overlapping calls are not coalesced; the last response wins.
    pub async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
        kind: Option<NotificationKind>,
        refresh: bool,
    ) -> Result<NotificationSnapshot, ApiError> {
        let query = ListQuery {
            page,
            page_size,
            kind,
        };
        let response = self.api.list(&query).await?;

        let mut state = self.lock();
        if page == 1 || refresh {
            state.notifications = response.list;
        } else {
            state.notifications.extend(response.list);
        }
        state.total = response.total;
        state.unread_count = response.unread_count;
        state.current_page = page;
        state.page_size = page_size;
        Ok(snapshot_of(&state))
    }

    /// Refresh only the unread counter from the server.
    pub async fn fetch_unread_count(&self) -> Result<u64, ApiError> {
        let response = self.api.unread_count().await?;
        let mut state = self.lock();
        state.unread_count = response.unread_count;
        Ok(response.unread_count)
    }

    /// Mark one notification read: optimistic local flip first, then the
    /// REST call. A failed call is logged and the optimistic state stands;
    /// the server operation is idempotent and the next refresh reconciles.
    pub async fn mark_read(&self, id: i64) {
        {
            let mut state = self.lock();
            mark_one_read(&mut state, id);
        }
        self.broadcaster
            .publish(BroadcastKind::ItemRead, serde_json::json!({ "id": id }));

        if let Err(e) = self.api.mark_read(id).await {
            tracing::warn!("mark-read({id}) failed, keeping optimistic state: {e}");
        }
    }

    /// Mark everything read locally, tell the server, tell the other tabs.
    pub async fn mark_all_read(&self) {
        {
            let mut state = self.lock();
            for item in &mut state.notifications {
                item.is_read = true;
            }
            state.unread_count = 0;
        }
        self.broadcaster
            .publish(BroadcastKind::AllRead, serde_json::Value::Null);

        if let Err(e) = self.api.mark_all_read().await {
            tracing::warn!("mark-all-read failed, keeping optimistic state: {e}");
        }
    }

    /// Ingest a live-pushed notification: prepend, bump the unread count,
    /// request a desktop toast and tell the other tabs. Duplicates of an
    /// already-known item are dropped (at-least-once delivery upstream).
    pub fn ingest_push(&self, item: NotificationItem) {
        {
            let mut state = self.lock();
            if is_duplicate(&state.notifications, &item) {
                tracing::debug!("dropping duplicate pushed notification");
                return;
            }
            if !item.is_read {
                state.unread_count += 1;
            }
            state.notifications.insert(0, item.clone());
            state.total += 1;
        }

        self.request_display(&item);

        match serde_json::to_value(&item) {
            Ok(data) => self.broadcaster.publish(BroadcastKind::NewItem, data),
            Err(e) => tracing::error!("failed to encode pushed notification: {e}"),
        }
    }

    /// Apply an event another tab broadcast. Races against local pushes are
    /// tolerated: dedup keeps the list correct and the floor keeps the
    /// count safe even when ordering is not strict.
    pub fn apply_remote_event(&self, event: &BroadcastEvent) {
        match event.kind {
            BroadcastKind::NewItem => {
                let item: NotificationItem = match serde_json::from_value(event.data.clone()) {
                    Ok(item) => item,
                    Err(e) => {
                        tracing::debug!("dropping undecodable remote notification: {e}");
                        return;
                    }
                };
                let mut state = self.lock();
                if is_duplicate(&state.notifications, &item) {
                    return;
                }
                if !item.is_read {
                    state.unread_count += 1;
                }
                state.notifications.insert(0, item);
                state.total += 1;
            }
            BroadcastKind::ItemRead => {
                let Some(id) = event.data.get("id").and_then(|v| v.as_i64()) else {
                    tracing::debug!("remote item-read event without id");
                    return;
                };
                let mut state = self.lock();
                mark_one_read(&mut state, id);
            }
            BroadcastKind::AllRead => {
                let mut state = self.lock();
                for item in &mut state.notifications {
                    item.is_read = true;
                }
                state.unread_count = 0;
            }
        }
    }

    /// Current view of the store.
    pub fn snapshot(&self) -> NotificationSnapshot {
        snapshot_of(&self.lock())
    }

    /// Forget everything; the session ended.
    pub fn reset(&self) {
        *self.lock() = StoreState::default();
    }

    /// Feed this store from the socket: registers a message callback that
    /// ingests pushed notifications. Keep the returned handle alive.
    pub fn attach(self: &Arc<Self>, manager: &SocketManager, url: &str) -> Subscription {
        let store = self.clone();
        manager.subscribe_messages(url, move |frame| {
            if let ServerFrame::Notification { data } = frame {
                store.ingest_push(data.clone());
            }
        })
    }

    /// Apply events broadcast by sibling tabs. Keep the returned handle
    /// alive.
    pub fn listen(self: &Arc<Self>) -> BroadcastSubscription {
        let store = self.clone();
        self.broadcaster
            .subscribe(move |event| store.apply_remote_event(&event))
    }

    fn request_display(&self, item: &NotificationItem) {
        if !self.notifier_config.enabled {
            return;
        }
        let permission = match self.notifier.permission() {
            Permission::Default => self.notifier.request_permission(),
            known => known,
        };
        if permission != Permission::Granted {
            return;
        }
        let title = match item.kind {
            NotificationKind::Comment => "New comment",
            NotificationKind::Reply => "New reply",
            NotificationKind::Like => "New like",
            NotificationKind::Follow => "New follower",
            _ => "New notification",
        };
        self.notifier.show(&DesktopNotification::new(
            title,
            format!("{}: {}", item.sender.username, item.content),
        ));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().expect("notification store lock poisoned")
    }
}

/// Flip one item read and decrement the counter, floored at zero. The
/// flip is idempotent: an already-read item never decrements twice.
fn mark_one_read(state: &mut StoreState, id: i64) {
    let item = state
        .notifications
        .iter_mut()
        .find(|item| item.id == Some(id));
    match item {
        Some(item) if !item.is_read => {
            item.is_read = true;
            state.unread_count = state.unread_count.saturating_sub(1);
        }
        _ => {}
    }
}

fn snapshot_of(state: &StoreState) -> NotificationSnapshot {
    NotificationSnapshot {
        notifications: state.notifications.clone(),
        unread_count: state.unread_count,
        total: state.total,
        current_page: state.current_page,
        page_size: state.page_size,
    }
}

/// At-least-once dedup: same server id, or, while an id is not yet
/// assigned on either side, same content and sender within a 10 second
/// window.
fn is_duplicate(existing: &[NotificationItem], candidate: &NotificationItem) -> bool {
    existing.iter().any(|item| match (item.id, candidate.id) {
        (Some(a), Some(b)) => a == b,
        _ => {
            item.content == candidate.content
                && item.sender.id == candidate.sender.id
                && (item.created_at - candidate.created_at)
                    .num_seconds()
                    .abs()
                    <= 10
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use pressroom_shared::{MutationAck, NotificationPage, SenderRef, UnreadCount};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::broadcast::{MemoryStorage, SharedStorage};
    use crate::notify::LogNotifier;

    #[derive(Default)]
    struct FakeApi {
        page: Mutex<Option<NotificationPage>>,
        read_calls: Mutex<Vec<i64>>,
        read_all_calls: AtomicUsize,
        fail_mutations: bool,
    }

    #[async_trait]
    impl NotificationApi for FakeApi {
        async fn list(&self, _query: &ListQuery) -> Result<NotificationPage, ApiError> {
            self.page
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ApiError::Network("no page configured".to_string()))
        }

        async fn unread_count(&self) -> Result<UnreadCount, ApiError> {
            let unread_count = self
                .page
                .lock()
                .unwrap()
                .as_ref()
                .map(|p| p.unread_count)
                .unwrap_or(0);
            Ok(UnreadCount { unread_count })
        }

        async fn mark_read(&self, id: i64) -> Result<MutationAck, ApiError> {
            self.read_calls.lock().unwrap().push(id);
            if self.fail_mutations {
                return Err(ApiError::Http {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(MutationAck {
                success: true,
                message: None,
            })
        }

        async fn mark_all_read(&self) -> Result<MutationAck, ApiError> {
            self.read_all_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_mutations {
                return Err(ApiError::Http {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(MutationAck {
                success: true,
                message: None,
            })
        }
    }

    fn item(id: Option<i64>, content: &str) -> NotificationItem {
        NotificationItem {
            id,
            kind: NotificationKind::Comment,
            sender: SenderRef {
                id: 1,
                username: "mira".to_string(),
                avatar: None,
            },
            content: content.to_string(),
            related: None,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    fn store_with(api: Arc<FakeApi>) -> Arc<NotificationStore> {
        let storage = Arc::new(MemoryStorage::new()) as Arc<dyn SharedStorage>;
        Arc::new(NotificationStore::new(
            api,
            TabBroadcaster::new(storage),
            Arc::new(LogNotifier),
        ))
    }

    fn page(items: Vec<NotificationItem>, total: u64, unread: u64) -> NotificationPage {
        NotificationPage {
            list: items,
            total,
            unread_count: unread,
        }
    }

    #[tokio::test]
    async fn fetch_page_one_replaces_and_takes_server_totals() {
        let api = Arc::new(FakeApi::default());
        *api.page.lock().unwrap() = Some(page(vec![item(Some(1), "a")], 40, 7));
        let store = store_with(api.clone());

        // stale optimistic state from a previous push
        store.ingest_push(item(Some(99), "stale"));

        let snap = store.fetch_page(1, 10, None, false).await.unwrap();
        assert_eq!(snap.notifications.len(), 1);
        assert_eq!(snap.unread_count, 7);
        assert_eq!(snap.total, 40);
        assert_eq!(snap.current_page, 1);
    }

    #[tokio::test]
    async fn fetch_later_page_appends() {
        let api = Arc::new(FakeApi::default());
        *api.page.lock().unwrap() = Some(page(vec![item(Some(1), "a")], 2, 2));
        let store = store_with(api.clone());
        store.fetch_page(1, 1, None, false).await.unwrap();

        *api.page.lock().unwrap() = Some(page(vec![item(Some(2), "b")], 2, 2));
        let snap = store.fetch_page(2, 1, None, false).await.unwrap();
        assert_eq!(snap.notifications.len(), 2);
        assert_eq!(snap.current_page, 2);
    }

    #[tokio::test]
    async fn fetch_unread_count_overwrites_optimistic_deltas() {
        let api = Arc::new(FakeApi::default());
        *api.page.lock().unwrap() = Some(page(vec![], 0, 4));
        let store = store_with(api.clone());

        // local pushes drifted the counter away from the server's truth
        store.ingest_push(item(Some(1), "a"));
        store.ingest_push(item(Some(2), "b"));
        assert_eq!(store.snapshot().unread_count, 2);

        let count = store.fetch_unread_count().await.unwrap();
        assert_eq!(count, 4);
        assert_eq!(store.snapshot().unread_count, 4, "server value wins");
    }

    #[tokio::test]
    async fn mark_read_flips_decrements_and_calls_api() {
        let api = Arc::new(FakeApi::default());
        *api.page.lock().unwrap() = Some(page(
            vec![item(Some(42), "a"), item(Some(43), "b"), item(Some(44), "c")],
            3,
            3,
        ));
        let store = store_with(api.clone());
        store.fetch_page(1, 10, None, false).await.unwrap();

        store.mark_read(42).await;

        let snap = store.snapshot();
        assert_eq!(snap.unread_count, 2);
        let marked = snap
            .notifications
            .iter()
            .find(|n| n.id == Some(42))
            .unwrap();
        assert!(marked.is_read);
        assert_eq!(api.read_calls.lock().unwrap().as_slice(), &[42]);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_floored() {
        let api = Arc::new(FakeApi::default());
        *api.page.lock().unwrap() = Some(page(vec![item(Some(1), "a")], 1, 1));
        let store = store_with(api.clone());
        store.fetch_page(1, 10, None, false).await.unwrap();

        store.mark_read(1).await;
        store.mark_read(1).await;
        store.mark_read(777).await; // unknown id

        let snap = store.snapshot();
        assert_eq!(snap.unread_count, 0);
        assert!(snap.notifications[0].is_read);
    }

    #[tokio::test]
    async fn mark_read_failure_keeps_optimistic_state() {
        let api = Arc::new(FakeApi {
            fail_mutations: true,
            ..FakeApi::default()
        });
        *api.page.lock().unwrap() = Some(page(vec![item(Some(5), "a")], 1, 1));
        let store = store_with(api.clone());
        store.fetch_page(1, 10, None, false).await.unwrap();

        store.mark_read(5).await;

        let snap = store.snapshot();
        assert!(snap.notifications[0].is_read, "no rollback on API failure");
        assert_eq!(snap.unread_count, 0);
    }

    #[tokio::test]
    async fn ingest_push_prepends_and_counts() {
        let store = store_with(Arc::new(FakeApi::default()));
        store.ingest_push(item(Some(1), "first"));
        store.ingest_push(item(Some(2), "second"));

        let snap = store.snapshot();
        assert_eq!(snap.notifications[0].id, Some(2), "newest first");
        assert_eq!(snap.unread_count, 2);
        assert_eq!(snap.total, 2);
    }

    #[tokio::test]
    async fn duplicate_push_and_remote_event_yield_one_entry() {
        let store = store_with(Arc::new(FakeApi::default()));
        let pushed = item(Some(7), "dup");
        store.ingest_push(pushed.clone());

        let remote = BroadcastEvent::new(
            BroadcastKind::NewItem,
            serde_json::to_value(&pushed).unwrap(),
            "other-tab",
        );
        store.apply_remote_event(&remote);
        store.apply_remote_event(&remote);

        let snap = store.snapshot();
        assert_eq!(snap.notifications.len(), 1);
        assert_eq!(snap.unread_count, 1);
    }

    #[tokio::test]
    async fn unassigned_id_dedup_uses_content_sender_and_window() {
        let store = store_with(Arc::new(FakeApi::default()));
        let mut first = item(None, "same words");
        first.created_at = Utc::now();
        store.ingest_push(first.clone());

        // within the window: duplicate
        let mut close = first.clone();
        close.created_at = first.created_at + ChronoDuration::seconds(5);
        store.ingest_push(close);
        assert_eq!(store.snapshot().notifications.len(), 1);

        // outside the window: distinct
        let mut far = first.clone();
        far.created_at = first.created_at + ChronoDuration::seconds(30);
        store.ingest_push(far);
        assert_eq!(store.snapshot().notifications.len(), 2);
    }

    #[tokio::test]
    async fn unread_count_never_goes_negative() {
        let store = store_with(Arc::new(FakeApi::default()));
        // remote read events for items we never saw
        for id in 0..5 {
            store.apply_remote_event(&BroadcastEvent::new(
                BroadcastKind::ItemRead,
                serde_json::json!({ "id": id }),
                "other-tab",
            ));
        }
        store.apply_remote_event(&BroadcastEvent::new(
            BroadcastKind::AllRead,
            serde_json::Value::Null,
            "other-tab",
        ));
        assert_eq!(store.snapshot().unread_count, 0);

        // a racing local push after a remote all-read stays safe
        store.ingest_push(item(Some(1), "late"));
        assert_eq!(store.snapshot().unread_count, 1);
    }

    #[tokio::test]
    async fn read_state_is_monotonic() {
        let store = store_with(Arc::new(FakeApi::default()));
        let pushed = item(Some(3), "once");
        store.ingest_push(pushed.clone());
        store.mark_read(3).await;

        // replaying the same unread item must not resurrect it
        store.apply_remote_event(&BroadcastEvent::new(
            BroadcastKind::NewItem,
            serde_json::to_value(&pushed).unwrap(),
            "other-tab",
        ));

        let snap = store.snapshot();
        assert_eq!(snap.notifications.len(), 1);
        assert!(snap.notifications[0].is_read);
        assert_eq!(snap.unread_count, 0);
    }

    #[tokio::test]
    async fn mark_all_read_reaches_the_sibling_tab() {
        // Scenario: tab A and tab B share origin storage; no socket traffic
        // is involved in propagating A's bulk read to B.
        let storage = Arc::new(MemoryStorage::new());
        let api_a = Arc::new(FakeApi::default());
        let api_b = Arc::new(FakeApi::default());
        let store_a = Arc::new(NotificationStore::new(
            api_a,
            TabBroadcaster::new(storage.clone() as Arc<dyn SharedStorage>),
            Arc::new(LogNotifier),
        ));
        let store_b = Arc::new(NotificationStore::new(
            api_b,
            TabBroadcaster::new(storage as Arc<dyn SharedStorage>),
            Arc::new(LogNotifier),
        ));
        let _listen_a = store_a.listen();
        let _listen_b = store_b.listen();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // a push in tab A materializes in tab B through the broadcast
        store_a.ingest_push(item(Some(11), "hello"));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store_b.snapshot().unread_count, 1);

        store_a.mark_all_read().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let snap_b = store_b.snapshot();
        assert_eq!(snap_b.unread_count, 0);
        assert!(snap_b.notifications.iter().all(|n| n.is_read));
    }

    #[tokio::test]
    async fn reset_clears_session_state() {
        let store = store_with(Arc::new(FakeApi::default()));
        store.ingest_push(item(Some(1), "a"));
        store.reset();
        let snap = store.snapshot();
        assert!(snap.notifications.is_empty());
        assert_eq!(snap.unread_count, 0);
        assert_eq!(snap.total, 0);
    }
}
