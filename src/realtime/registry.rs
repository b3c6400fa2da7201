use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::identity::ActorId;
use crate::notifications::types::Notification;
use crate::realtime::channel::{ChannelEvent, ChannelLink, ChannelOptions, run_channel};
use crate::realtime::transport::RealtimeTransport;

struct SharedChannel {
    link: ChannelLink,
    cancel: CancellationToken,
    subscribers: usize,
}

/// One realtime connection per actor, shared by every subscriber and torn
/// down when the last handle is closed or dropped.
#[derive(Clone)]
pub struct ChannelRegistry {
    transport: Arc<dyn RealtimeTransport>,
    options: ChannelOptions,
    channels: Arc<DashMap<ActorId, SharedChannel>>,
}

impl ChannelRegistry {
    pub fn new(transport: Arc<dyn RealtimeTransport>, options: ChannelOptions) -> Self {
        Self {
            transport,
            options,
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Attaches to the actor's channel, dialing it if this is the first
    /// subscriber. Must be called from within a tokio runtime.
    pub fn connect(&self, actor_id: &ActorId) -> ChannelHandle {
        let (receiver, pending) = match self.channels.entry(actor_id.clone()) {
            Entry::Occupied(mut entry) => {
                let shared = entry.get_mut();
                shared.subscribers += 1;
                let receiver = shared.link.subscribe();
                // The room may have been joined before this subscriber
                // attached; replay that state as its first event.
                let pending = shared.link.is_joined().then(|| ChannelEvent::Joined {
                    actor_id: actor_id.clone(),
                });
                (receiver, pending)
            }
            Entry::Vacant(entry) => {
                let link = ChannelLink::new(self.options.event_buffer);
                let receiver = link.subscribe();
                let cancel = CancellationToken::new();
                tracing::info!(
                    event = "realtime_connect",
                    actor_id = %actor_id,
                    "opening realtime channel"
                );
                tokio::spawn(run_channel(
                    Arc::clone(&self.transport),
                    actor_id.clone(),
                    self.options.clone(),
                    link.clone(),
                    cancel.clone(),
                ));
                entry.insert(SharedChannel {
                    link,
                    cancel,
                    subscribers: 1,
                });
                (receiver, None)
            }
        };
        ChannelHandle {
            actor_id: actor_id.clone(),
            receiver,
            pending,
            registry: self.clone(),
            released: false,
        }
    }

    /// Whether the actor's shared channel currently has its room joined.
    pub fn is_joined(&self, actor_id: &ActorId) -> bool {
        self.channels
            .get(actor_id)
            .is_some_and(|shared| shared.link.is_joined())
    }

    pub fn is_connected(&self, actor_id: &ActorId) -> bool {
        self.channels.contains_key(actor_id)
    }

    pub fn subscriber_count(&self, actor_id: &ActorId) -> usize {
        self.channels
            .get(actor_id)
            .map(|shared| shared.subscribers)
            .unwrap_or(0)
    }

    fn release(&self, actor_id: &ActorId) {
        let removed = self.channels.remove_if_mut(actor_id, |_, shared| {
            shared.subscribers = shared.subscribers.saturating_sub(1);
            shared.subscribers == 0
        });
        if let Some((_, shared)) = removed {
            shared.cancel.cancel();
            tracing::info!(
                event = "realtime_close",
                actor_id = %actor_id,
                "closing realtime channel"
            );
        }
    }
}

/// A subscriber's view of a shared channel. Events are delivered through a
/// queue this handle drains; dropping the handle releases the subscription.
pub struct ChannelHandle {
    actor_id: ActorId,
    receiver: broadcast::Receiver<ChannelEvent>,
    pending: Option<ChannelEvent>,
    registry: ChannelRegistry,
    released: bool,
}

impl ChannelHandle {
    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Next channel event, or `None` once the channel is closed. Events
    /// missed because this subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(ChannelEvent::Closed) | Err(RecvError::Closed) => return None,
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        event = "realtime_lagged",
                        actor_id = %self.actor_id,
                        skipped,
                        "subscriber fell behind realtime events"
                    );
                }
            }
        }
    }

    /// Next pushed notification, skipping connection lifecycle events.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        loop {
            if let ChannelEvent::Notification(notification) = self.recv().await? {
                return Some(notification);
            }
        }
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release(&self.actor_id);
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.release();
    }
}
