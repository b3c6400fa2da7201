use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "https://backend-entreprise.onrender.com";
pub const DEFAULT_VAPID_PUBLIC_KEY: &str =
    "BGis7GkE_nZE6FsfpuNOFt_Hc02_lyUqVUhOLgwitPmxt2Ze5uTomnu9xlEJd-mck8VrtHAfg2gQv_iGmUA1Cfc";
pub const DEFAULT_WORKER_PATH: &str = "/sw.js";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub session: Option<SessionConfig>,
    #[serde(default)]
    pub realtime: Option<RealtimeConfig>,
    #[serde(default)]
    pub notifications: Option<NotificationsConfig>,
    #[serde(default)]
    pub push: Option<PushConfig>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ApiConfig {
    pub url: Option<String>,
    pub socket_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SessionConfig {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RealtimeConfig {
    pub reconnect_base_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
    pub max_attempts: Option<usize>,
    pub event_buffer: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct NotificationsConfig {
    pub dedupe: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PushConfig {
    pub vapid_public_key: Option<String>,
    pub worker_path: Option<String>,
    pub unsubscribe_on_failure: Option<bool>,
    pub endpoint: Option<String>,
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Fills unset values from `PORTAL_API_URL`, `PORTAL_SOCKET_URL` and
    /// `PORTAL_SESSION_FILE`. File values win over the environment.
    pub fn with_env_overrides(mut self) -> Self {
        let api = self.api.get_or_insert_with(ApiConfig::default);
        if api.url.is_none() {
            api.url = non_blank_env("PORTAL_API_URL");
        }
        if api.socket_url.is_none() {
            api.socket_url = non_blank_env("PORTAL_SOCKET_URL");
        }
        let session = self.session.get_or_insert_with(SessionConfig::default);
        if session.path.is_none() {
            session.path = non_blank_env("PORTAL_SESSION_FILE");
        }
        self
    }

    pub fn endpoints(&self) -> ApiEndpoints {
        let api = self.api.as_ref();
        let raw = api
            .and_then(|api| api.url.as_deref())
            .unwrap_or(DEFAULT_API_URL);
        let socket = api.and_then(|api| api.socket_url.as_deref());
        ApiEndpoints::derive(raw, socket)
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.api
            .as_ref()
            .and_then(|api| api.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn session_path(&self) -> PathBuf {
        self.session
            .as_ref()
            .and_then(|session| session.path.as_ref())
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("portal-notify")
                    .join("session.json")
            })
    }

    pub fn dedupe_notifications(&self) -> bool {
        self.notifications
            .as_ref()
            .and_then(|notifications| notifications.dedupe)
            .unwrap_or(true)
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|logging| logging.level.as_deref())
            .unwrap_or("info")
    }
}

impl RealtimeConfig {
    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms.unwrap_or(1000))
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms.unwrap_or(5000))
    }

    /// `None` retries forever.
    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts.filter(|attempts| *attempts > 0)
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer.unwrap_or(256).max(1)
    }
}

impl PushConfig {
    pub fn vapid_public_key(&self) -> &str {
        self.vapid_public_key
            .as_deref()
            .unwrap_or(DEFAULT_VAPID_PUBLIC_KEY)
    }

    pub fn worker_path(&self) -> &str {
        self.worker_path.as_deref().unwrap_or(DEFAULT_WORKER_PATH)
    }

    pub fn unsubscribe_on_failure(&self) -> bool {
        self.unsubscribe_on_failure.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    /// REST root, always ending in `/api`.
    pub api: String,
    /// Server origin without the `/api` suffix.
    pub base: String,
    /// Realtime server origin.
    pub socket: String,
}

impl ApiEndpoints {
    pub fn derive(raw: &str, socket: Option<&str>) -> Self {
        let trimmed = raw.trim().trim_end_matches('/');
        let api = if trimmed.ends_with("/api") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/api")
        };
        let base = trimmed
            .strip_suffix("/api")
            .unwrap_or(trimmed)
            .trim_end_matches('/')
            .to_string();
        let socket = socket
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| base.clone());
        Self { api, base, socket }
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
