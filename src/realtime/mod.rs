pub mod channel;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use channel::{ChannelEvent, ChannelOptions};
pub use error::{ChannelError, ProtocolError};
pub use registry::{ChannelHandle, ChannelRegistry};
pub use transport::{RealtimeConnection, RealtimeTransport, WebSocketTransport};
