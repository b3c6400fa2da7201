use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::realtime::error::{ChannelError, ChannelResult};

pub const ENGINE_PATH: &str = "socket.io/";

/// Dials the realtime server. Each call yields a fresh connection; the
/// channel calls it again after every drop.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn open(&self) -> ChannelResult<Box<dyn RealtimeConnection>>;
}

/// One live connection carrying text frames.
#[async_trait]
pub trait RealtimeConnection: Send {
    async fn send(&mut self, frame: String) -> ChannelResult<()>;
    /// `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Option<ChannelResult<String>>;
    async fn close(&mut self);
}

/// Builds `ws(s)://host/socket.io/?EIO=4&transport=websocket` from an
/// `http(s)` or `ws(s)` origin.
pub fn engine_url(origin: &str) -> ChannelResult<Url> {
    let mut url = Url::parse(origin.trim())
        .map_err(|err| ChannelError::InvalidUrl(format!("{origin}: {err}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    let mut url = url
        .join(ENGINE_PATH)
        .map_err(|err| ChannelError::InvalidUrl(err.to_string()))?;
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(origin: &str) -> ChannelResult<Self> {
        Ok(Self {
            url: engine_url(origin)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RealtimeTransport for WebSocketTransport {
    async fn open(&self) -> ChannelResult<Box<dyn RealtimeConnection>> {
        let request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| ChannelError::InvalidUrl(err.to_string()))?;
        let (stream, _) = connect_async(request)
            .await
            .map_err(|err| ChannelError::Connect(err.to_string()))?;
        let (write, read) = stream.split();
        Ok(Box::new(WebSocketConnection { write, read }))
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WebSocketConnection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

#[async_trait]
impl RealtimeConnection for WebSocketConnection {
    async fn send(&mut self, frame: String) -> ChannelResult<()> {
        self.write
            .send(Message::Text(frame.into()))
            .await
            .map_err(|err| ChannelError::Transport(err.to_string()))
    }

    async fn recv(&mut self) -> Option<ChannelResult<String>> {
        loop {
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(ChannelError::Transport(err.to_string()))),
            };
            match message {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.write.send(Message::Close(None)).await;
        let _ = self.write.close().await;
    }
}
