//! REST collaborators at the interface boundary: snapshot fetch, read
//! acknowledgement and token refresh.
//!
//! The paginated list machinery behind these endpoints is not this crate's
//! concern; only the contracts live here, behind traits so tests and other
//! transports can substitute implementations.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Client-side API failure, shaped for direct surfacing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// One page of the notification snapshot. Items stay untyped here; the
/// normalizer is the single place that validates records.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPage {
    pub items: Vec<Value>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Snapshot and acknowledgement endpoints.
#[async_trait]
pub trait NotificationsApi: Send + Sync {
    /// `GET /notifications?limit&offset`.
    async fn fetch_page(&self, limit: u64, offset: u64) -> Result<NotificationPage, ApiError>;

    /// `PATCH /notifications/{id}` with `{ is_read }`; returns the
    /// authoritative entity.
    async fn set_read(&self, id: &str, is_read: bool) -> Result<Value, ApiError>;
}

/// Supplies fresh access tokens when the held one expires.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn refresh(&self) -> Result<String, ApiError>;
}

/// reqwest-backed implementation of the notification endpoints.
#[derive(Debug, Clone)]
pub struct RestNotificationsApi {
    client: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl RestNotificationsApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer: None,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        rb: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let rb = match &self.bearer {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        };
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
}

#[async_trait]
impl NotificationsApi for RestNotificationsApi {
    async fn fetch_page(&self, limit: u64, offset: u64) -> Result<NotificationPage, ApiError> {
        let url = self.url(&format!("notifications?limit={limit}&offset={offset}"));
        self.read_json(self.client.get(&url)).await
    }

    async fn set_read(&self, id: &str, is_read: bool) -> Result<Value, ApiError> {
        let url = self.url(&format!("notifications/{id}"));
        self.read_json(self.client.patch(&url).json(&json!({ "is_read": is_read })))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_urls_without_doubled_slashes() {
        let api = RestNotificationsApi::new("https://api.example.com/v1/");
        assert_eq!(
            api.url("/notifications/n1"),
            "https://api.example.com/v1/notifications/n1"
        );
        assert_eq!(
            api.url("notifications?limit=20&offset=0"),
            "https://api.example.com/v1/notifications?limit=20&offset=0"
        );
    }
}
