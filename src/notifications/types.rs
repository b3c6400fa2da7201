use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TITLE: &str = "Notification";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NotificationPayload")]
pub struct Notification {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
    pub read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Wire shape of a notification. Document stores send `_id`, sometimes
/// alongside a virtual `id`; `_id` wins when both are present.
#[derive(Debug, Deserialize)]
struct NotificationPayload {
    #[serde(rename = "_id", default)]
    document_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    read: bool,
    /// Realtime payloads occasionally arrive without a timestamp; those are
    /// stamped on receipt.
    #[serde(rename = "createdAt", default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationPayload> for Notification {
    type Error = String;

    fn try_from(payload: NotificationPayload) -> Result<Self, Self::Error> {
        let id = payload
            .document_id
            .or(payload.id)
            .ok_or_else(|| "notification has neither `_id` nor `id`".to_string())?;
        Ok(Self {
            id,
            title: payload.title,
            message: payload.message,
            read: payload.read,
            created_at: payload.created_at,
        })
    }
}

impl Notification {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE)
    }
}

/// Authoritative server state at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(rename = "unreadCount", default)]
    pub unread_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
