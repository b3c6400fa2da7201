//! What the background delivery worker shows for a push message, and where
//! a click on it leads.

use serde::{Deserialize, Serialize};

pub const ICON: &str = "/logo192.png";
pub const BADGE: &str = "/favicon.ico";
pub const VIBRATE_PATTERN: [u32; 3] = [100, 50, 100];
pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayNotification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: DisplayData,
    pub actions: Vec<DisplayAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayData {
    pub date_of_arrival: i64,
    pub primary_key: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Close,
    Open(String),
}

/// Builds the notification for a push payload. Empty payloads show nothing.
pub fn display_for(payload: &[u8]) -> Result<Option<DisplayNotification>, serde_json::Error> {
    if payload.is_empty() {
        return Ok(None);
    }
    let message: PushMessage = serde_json::from_slice(payload)?;
    Ok(Some(DisplayNotification {
        title: message.title,
        body: message.body,
        icon: ICON.to_string(),
        badge: BADGE.to_string(),
        vibrate: VIBRATE_PATTERN.to_vec(),
        data: DisplayData {
            date_of_arrival: chrono::Utc::now().timestamp_millis(),
            primary_key: "2".to_string(),
            url: message.url,
        },
        actions: vec![
            DisplayAction {
                action: EXPLORE_ACTION.to_string(),
                title: "Voir".to_string(),
                icon: "/checkmark.png".to_string(),
            },
            DisplayAction {
                action: CLOSE_ACTION.to_string(),
                title: "Fermer".to_string(),
                icon: "/xmark.png".to_string(),
            },
        ],
    }))
}

/// The notification is always closed; `explore` also opens its url.
pub fn on_click(notification: &DisplayNotification, action: Option<&str>) -> ClickOutcome {
    match action {
        Some(EXPLORE_ACTION) => ClickOutcome::Open(
            notification
                .data
                .url
                .clone()
                .unwrap_or_else(|| "/".to_string()),
        ),
        _ => ClickOutcome::Close,
    }
}
