//! REST collaborators for notification history and read-state mutations.
//!
//! The store talks to this through the [`NotificationApi`] trait so tests
//! can substitute a recording fake; [`HttpNotificationApi`] is the real
//! reqwest-backed client.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;

use pressroom_shared::{ApiError, ListQuery, MutationAck, NotificationPage, UnreadCount};

/// Paginated history read plus the two read-state mutations.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<NotificationPage, ApiError>;
    async fn unread_count(&self) -> Result<UnreadCount, ApiError>;
    async fn mark_read(&self, id: i64) -> Result<MutationAck, ApiError>;
    async fn mark_all_read(&self) -> Result<MutationAck, ApiError>;
}

/// HTTP client for the notification endpoints of a pressroom server.
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpNotificationApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            token: None,
        }
    }

    /// Attach the bearer token used on every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let mut rb = self.client.get(self.url(path));
        if let Some(token) = &self.token {
            rb = rb.bearer_auth(token);
        }
        let resp = rb
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let mut rb = self.client.post(self.url(path));
        if let Some(token) = &self.token {
            rb = rb.bearer_auth(token);
        }
        let resp = rb
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self, query: &ListQuery) -> Result<NotificationPage, ApiError> {
        let mut path = format!(
            "/api/notifications?page={}&page_size={}",
            query.page, query.page_size
        );
        if let Some(kind) = query.kind {
            let kind = serde_json::to_value(kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            path.push_str(&format!("&kind={kind}"));
        }
        self.get_json(&path).await
    }

    async fn unread_count(&self) -> Result<UnreadCount, ApiError> {
        self.get_json("/api/notifications/unread-count").await
    }

    async fn mark_read(&self, id: i64) -> Result<MutationAck, ApiError> {
        self.post_json(&format!("/api/notifications/{id}/read")).await
    }

    async fn mark_all_read(&self) -> Result<MutationAck, ApiError> {
        self.post_json("/api/notifications/read-all").await
    }
}
