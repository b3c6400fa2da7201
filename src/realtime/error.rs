#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine packet type '{0}'")]
    UnknownEngineType(char),
    #[error("unknown socket packet type '{0}'")]
    UnknownSocketType(char),
    #[error("binary packets are not supported")]
    BinaryUnsupported,
    #[error("invalid packet payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid realtime url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed")]
    Closed,
    #[error("no ping from server within {0:?}")]
    PingTimeout(std::time::Duration),
    #[error("namespace connect refused: {0}")]
    Refused(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
