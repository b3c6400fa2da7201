use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::json;

use crate::notifications::error::{SyncError, SyncResult};
use crate::notifications::types::{ApiEnvelope, Snapshot};
use crate::push::subscription::PushSubscription;

/// Server side of notification state. Implementations never touch the local
/// store; callers apply results themselves.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn fetch_snapshot(&self, token: Option<&str>) -> SyncResult<Snapshot>;
    /// Marking an already-read notification again must succeed.
    async fn mark_read(&self, id: &str, token: Option<&str>) -> SyncResult<()>;
    async fn register_push_subscription(
        &self,
        subscription: &PushSubscription,
        token: Option<&str>,
    ) -> SyncResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpNotificationClient {
    client: Client,
    api_base: Url,
}

impl HttpNotificationClient {
    pub fn new(api_base: &str, timeout: Option<Duration>) -> Result<Self, SyncError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| SyncError::Network(err.to_string()))?;
        Self::with_client(client, api_base)
    }

    pub fn with_client(client: Client, api_base: &str) -> Result<Self, SyncError> {
        let api_base = Url::parse(api_base.trim_end_matches('/'))
            .map_err(|err| SyncError::Network(format!("invalid api url {api_base}: {err}")))?;
        if api_base.cannot_be_a_base() {
            return Err(SyncError::Network(format!(
                "api url {api_base} cannot be a base"
            )));
        }
        Ok(Self { client, api_base })
    }

    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Network("api url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationClient {
    async fn fetch_snapshot(&self, token: Option<&str>) -> SyncResult<Snapshot> {
        let token = require_token(token)?;
        let url = self.endpoint(&["notifications"])?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let response = check_status(response).await?;
        let status = response.status().as_u16();
        let envelope: ApiEnvelope<Snapshot> = response.json().await?;
        if !envelope.is_success() {
            return Err(SyncError::Server {
                status,
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("unexpected status '{}'", envelope.status)),
            });
        }
        envelope.data.ok_or_else(|| SyncError::Server {
            status,
            message: "snapshot response has no data".to_string(),
        })
    }

    async fn mark_read(&self, id: &str, token: Option<&str>) -> SyncResult<()> {
        let token = require_token(token)?;
        let url = self.endpoint(&["notifications", id, "read"])?;
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn register_push_subscription(
        &self,
        subscription: &PushSubscription,
        token: Option<&str>,
    ) -> SyncResult<()> {
        let token = require_token(token)?;
        let url = self.endpoint(&["notifications", "subscribe"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(subscription)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

fn require_token(token: Option<&str>) -> SyncResult<&str> {
    token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(SyncError::missing_token)
}

async fn check_status(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Err(SyncError::Auth(message));
    }
    Err(SyncError::Server {
        status: status.as_u16(),
        message,
    })
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|message| message.as_str())
        .map(|message| message.to_string())
}
