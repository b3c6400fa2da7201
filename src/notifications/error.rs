#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl SyncError {
    pub fn missing_token() -> Self {
        SyncError::Auth("no session token".to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Auth(_) => "auth",
            SyncError::Network(_) => "network",
            SyncError::Server { .. } => "server",
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SyncError::Server {
                status: err.status().map(|status| status.as_u16()).unwrap_or(200),
                message: format!("invalid response body: {err}"),
            };
        }
        SyncError::Network(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
