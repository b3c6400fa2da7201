use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::config::RealtimeConfig;
use crate::identity::ActorId;
use crate::notifications::types::Notification;
use crate::realtime::error::{ChannelError, ChannelResult};
use crate::realtime::protocol::{
    EnginePacket, JOIN_EVENT, NOTIFICATION_EVENT, OpenInfo, SocketPacket,
};
use crate::realtime::transport::{RealtimeConnection, RealtimeTransport};

/// Used until the server's `open` packet announces its own ping schedule.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connecting { attempt: usize },
    Connected,
    Joined { actor_id: ActorId },
    Notification(Notification),
    Disconnected { reason: String },
    /// The channel gave up or was released; no further events follow.
    Closed,
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: Option<usize>,
    pub event_buffer: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl From<&RealtimeConfig> for ChannelOptions {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            base_backoff: config.reconnect_base(),
            max_backoff: config.reconnect_max(),
            max_attempts: config.max_attempts(),
            event_buffer: config.event_buffer(),
        }
    }
}

/// Event queue of a shared channel plus whether its room is currently
/// joined, so subscribers attaching late learn the link state.
#[derive(Clone)]
pub(crate) struct ChannelLink {
    events: broadcast::Sender<ChannelEvent>,
    joined: Arc<watch::Sender<bool>>,
}

impl ChannelLink {
    pub(crate) fn new(buffer: usize) -> Self {
        let (events, _) = broadcast::channel(buffer);
        let (joined, _) = watch::channel(false);
        Self {
            events,
            joined: Arc::new(joined),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub(crate) fn is_joined(&self) -> bool {
        *self.joined.borrow()
    }

    /// Link state is updated before the event goes out, so a subscriber
    /// that misses the event still reads the new state.
    fn publish(&self, event: ChannelEvent) {
        match &event {
            ChannelEvent::Joined { .. } => {
                self.joined.send_replace(true);
            }
            ChannelEvent::Disconnected { .. } | ChannelEvent::Closed => {
                self.joined.send_replace(false);
            }
            _ => {}
        }
        let _ = self.events.send(event);
    }
}

/// How a single connection ended.
enum Ended {
    Cancelled,
    Dropped(ChannelError),
}

/// Dials, joins the actor's room and forwards notifications until
/// `cancel` fires or reconnect attempts run out.
pub(crate) async fn run_channel(
    transport: Arc<dyn RealtimeTransport>,
    actor_id: ActorId,
    options: ChannelOptions,
    link: ChannelLink,
    cancel: CancellationToken,
) {
    let mut failures = 0usize;
    loop {
        link.publish(ChannelEvent::Connecting { attempt: failures });
        let opened = tokio::select! {
            _ = cancel.cancelled() => break,
            opened = transport.open() => opened,
        };
        let ended = match opened {
            Ok(mut connection) => {
                let (ended, joined) =
                    drive_connection(connection.as_mut(), &actor_id, &link, &cancel).await;
                connection.close().await;
                if joined {
                    failures = 0;
                }
                ended
            }
            Err(err) => Ended::Dropped(err),
        };
        let reason = match ended {
            Ended::Cancelled => break,
            Ended::Dropped(reason) => reason,
        };
        failures += 1;
        tracing::warn!(
            event = "realtime_disconnected",
            actor_id = %actor_id,
            attempts = failures,
            error = %reason,
            "realtime channel dropped"
        );
        link.publish(ChannelEvent::Disconnected {
            reason: reason.to_string(),
        });
        if options
            .max_attempts
            .is_some_and(|max_attempts| failures >= max_attempts)
        {
            tracing::warn!(
                event = "realtime_gave_up",
                actor_id = %actor_id,
                attempts = failures,
                "realtime reconnect attempts exhausted"
            );
            break;
        }
        let backoff = compute_backoff(failures, &options);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
    link.publish(ChannelEvent::Closed);
}

/// Returns how the connection ended and whether the room was joined.
async fn drive_connection(
    connection: &mut dyn RealtimeConnection,
    actor_id: &ActorId,
    link: &ChannelLink,
    cancel: &CancellationToken,
) -> (Ended, bool) {
    let mut liveness = HANDSHAKE_TIMEOUT;
    let mut joined = false;
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return (Ended::Cancelled, joined),
            frame = tokio::time::timeout(liveness, connection.recv()) => frame,
        };
        let frame = match frame {
            Err(_) => return (Ended::Dropped(ChannelError::PingTimeout(liveness)), joined),
            Ok(None) => return (Ended::Dropped(ChannelError::Closed), joined),
            Ok(Some(Err(err))) => return (Ended::Dropped(err), joined),
            Ok(Some(Ok(frame))) => frame,
        };
        let packet = match EnginePacket::decode(&frame) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(
                    event = "realtime_frame_invalid",
                    actor_id = %actor_id,
                    error = %err,
                    "skipping undecodable frame"
                );
                continue;
            }
        };
        let step = handle_packet(packet, connection, actor_id, link, &mut liveness).await;
        match step {
            Ok(Step::Continue) => {}
            Ok(Step::Joined) => joined = true,
            Err(err) => return (Ended::Dropped(err), joined),
        }
    }
}

enum Step {
    Continue,
    Joined,
}

async fn handle_packet(
    packet: EnginePacket,
    connection: &mut dyn RealtimeConnection,
    actor_id: &ActorId,
    link: &ChannelLink,
    liveness: &mut Duration,
) -> ChannelResult<Step> {
    match packet {
        EnginePacket::Open(info) => {
            *liveness = ping_deadline(&info);
            connection
                .send(EnginePacket::Message(SocketPacket::connect()).encode())
                .await?;
            Ok(Step::Continue)
        }
        EnginePacket::Ping(data) => {
            connection.send(EnginePacket::Pong(data).encode()).await?;
            Ok(Step::Continue)
        }
        EnginePacket::Close => Err(ChannelError::Closed),
        EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => Ok(Step::Continue),
        EnginePacket::Message(packet) => match packet {
            SocketPacket::Connect { .. } => {
                link.publish(ChannelEvent::Connected);
                join_room(connection, actor_id).await?;
                link.publish(ChannelEvent::Joined {
                    actor_id: actor_id.clone(),
                });
                Ok(Step::Joined)
            }
            SocketPacket::Event { name, args, .. } if name == NOTIFICATION_EVENT => {
                forward_notification(args, actor_id, link);
                Ok(Step::Continue)
            }
            SocketPacket::Event { name, .. } => {
                tracing::debug!(
                    event = "realtime_event_ignored",
                    actor_id = %actor_id,
                    name = %name,
                    "ignoring realtime event"
                );
                Ok(Step::Continue)
            }
            SocketPacket::Disconnect { .. } => Err(ChannelError::Closed),
            SocketPacket::ConnectError { data, .. } => Err(ChannelError::Refused(
                data.map(|data| data.to_string()).unwrap_or_default(),
            )),
            SocketPacket::Ack { .. } => Ok(Step::Continue),
        },
    }
}

/// Explicit room-join step, sent after every namespace connect.
async fn join_room(connection: &mut dyn RealtimeConnection, actor_id: &ActorId) -> ChannelResult<()> {
    let join = SocketPacket::event(JOIN_EVENT, vec![Value::String(actor_id.to_string())]);
    connection.send(EnginePacket::Message(join).encode()).await?;
    tracing::debug!(
        event = "realtime_joined",
        actor_id = %actor_id,
        "joined actor room"
    );
    Ok(())
}

fn forward_notification(
    args: Vec<Value>,
    actor_id: &ActorId,
    link: &ChannelLink,
) {
    let Some(payload) = args.into_iter().next() else {
        tracing::warn!(
            event = "realtime_notification_invalid",
            actor_id = %actor_id,
            "notification event without payload"
        );
        return;
    };
    match serde_json::from_value::<Notification>(payload) {
        Ok(notification) => {
            link.publish(ChannelEvent::Notification(notification));
        }
        Err(err) => {
            tracing::warn!(
                event = "realtime_notification_invalid",
                actor_id = %actor_id,
                error = %err,
                "notification payload could not be decoded"
            );
        }
    }
}

fn ping_deadline(info: &OpenInfo) -> Duration {
    let millis = info.ping_interval.saturating_add(info.ping_timeout);
    if millis == 0 {
        return HANDSHAKE_TIMEOUT;
    }
    Duration::from_millis(millis)
}

pub(crate) fn compute_backoff(attempt: usize, options: &ChannelOptions) -> Duration {
    let exp = attempt.saturating_sub(1) as u32;
    let multiplier = 1u64.checked_shl(exp.min(10)).unwrap_or(u64::MAX);
    let base = u64::try_from(options.base_backoff.as_millis()).unwrap_or(u64::MAX);
    let backoff = base.saturating_mul(multiplier);
    let max = u64::try_from(options.max_backoff.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(std::cmp::min(backoff, max))
}
