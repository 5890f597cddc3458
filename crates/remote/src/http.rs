//! `reqwest` implementation of the remote traits.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use trailpost_core::{ContentItem, ContentType};

use crate::api::{ContentApi, ListQuery, NotificationApi, Page};
use crate::error::RemoteError;
use crate::messages::{
    ApproveLocalRequest, ListResponse, MutationResponse, NotificationList, ReasonBody,
    RemoteNotification, TaskCounts, UnreadCount,
};

/// Default transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for [`HttpRemote`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL including the API prefix, e.g. `http://host:3000/api`.
    pub base_url: String,
    /// Bearer token; `None` for guests.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for the remote content, moderation and notification API.
pub struct HttpRemote {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpRemote {
    pub fn new(config: ClientConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RemoteError::Request)?;
        Ok(Self { client, config })
    }

    /// Reuse an existing [`reqwest::Client`]; its own timeout applies.
    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn moderation_action(
        &self,
        content_type: ContentType,
        id: &str,
        action: &str,
        reason: Option<&str>,
    ) -> Result<(), RemoteError> {
        let body = ReasonBody {
            reason: reason.map(str::to_string),
        };
        let response = self
            .post(&format!(
                "/moderation/{}/{id}/{action}",
                content_type.collection()
            ))
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. A 404 becomes
    /// [`RemoteError::NotFound`]; any other failure carries its body.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let path = response.url().path().to_string();
            tracing::debug!(path = %path, "Remote record not found");
            return Err(RemoteError::NotFound(path));
        }
        if !status.is_success() {
            let path = response.url().path().to_string();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(status = status.as_u16(), path = %path, "Remote request failed");
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), RemoteError> {
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Parse a mutation response, treating an empty body as "no
    /// persisted record".
    async fn parse_mutation(
        response: reqwest::Response,
        content_type: ContentType,
    ) -> Result<Option<ContentItem>, RemoteError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let parsed: MutationResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(error = %e, "Undecodable mutation response");
            RemoteError::Decode(e.to_string())
        })?;
        parsed.into_persisted(content_type)
    }
}

#[async_trait]
impl ContentApi for HttpRemote {
    async fn list(
        &self,
        content_type: ContentType,
        query: &ListQuery,
    ) -> Result<Page, RemoteError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(status) = query.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = query.offset {
            params.push(("offset", offset.to_string()));
        }

        let response = self
            .get(&format!("/{}", content_type.collection()))
            .query(&params)
            .send()
            .await?;
        let list: ListResponse = Self::parse_response(response).await?;

        let items = list
            .data
            .into_iter()
            .map(|record| record.into_item(content_type))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: list.total,
        })
    }

    async fn approve(
        &self,
        content_type: ContentType,
        id: &str,
    ) -> Result<Option<ContentItem>, RemoteError> {
        let response = self
            .post(&format!("/moderation/{}/{id}/approve", content_type.collection()))
            .send()
            .await?;
        Self::parse_mutation(response, content_type).await
    }

    async fn reject(
        &self,
        content_type: ContentType,
        id: &str,
        reason: &str,
    ) -> Result<(), RemoteError> {
        self.moderation_action(content_type, id, "reject", Some(reason))
            .await
    }

    async fn request_revision(
        &self,
        content_type: ContentType,
        id: &str,
        reason: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.moderation_action(content_type, id, "revision", reason)
            .await
    }

    async fn hide(
        &self,
        content_type: ContentType,
        id: &str,
        reason: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.moderation_action(content_type, id, "hide", reason).await
    }

    async fn approve_local(&self, item: &ContentItem) -> Result<Option<ContentItem>, RemoteError> {
        let body = ApproveLocalRequest::from_item(item);
        let response = self
            .post("/moderation/approve-local")
            .json(&body)
            .send()
            .await?;
        Self::parse_mutation(response, item.content_type).await
    }

    async fn task_counts(&self) -> Result<TaskCounts, RemoteError> {
        let response = self.get("/moderation/tasks-count").send().await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl NotificationApi for HttpRemote {
    async fn list(
        &self,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<RemoteNotification>, RemoteError> {
        let response = self
            .get("/notifications")
            .query(&[
                ("unreadOnly", unread_only.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        let list: NotificationList = Self::parse_response(response).await?;
        Ok(list.notifications)
    }

    async fn mark_read(&self, server_id: &str) -> Result<(), RemoteError> {
        let response = self
            .post(&format!("/notifications/{server_id}/read"))
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn mark_all_read(&self) -> Result<(), RemoteError> {
        let response = self.post("/notifications/read-all").send().await?;
        Self::check_status(response).await
    }

    async fn unread_count(&self) -> Result<i64, RemoteError> {
        let response = self.get("/notifications/unread-count").send().await?;
        let count: UnreadCount = Self::parse_response(response).await?;
        Ok(count.count)
    }
}
