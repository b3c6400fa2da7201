use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigError};
use crate::identity::{ActorId, IdentityResolver, SessionSource};
use crate::notifications::alerts::AlertSink;
use crate::notifications::client::{HttpNotificationClient, NotificationApi};
use crate::notifications::error::SyncResult;
use crate::notifications::store::{DuplicatePolicy, NotificationStore, NotificationsView};
use crate::push::{PushError, PushPlatform, PushSubscriptionManager};
use crate::realtime::{ChannelEvent, ChannelHandle, ChannelOptions, ChannelRegistry, WebSocketTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NoSession,
    /// Channel dialing or snapshot not yet seeded.
    Connecting,
    /// Snapshot seeded and actor room joined.
    Synced,
    /// Channel lost after having been open; REST calls still work.
    Degraded,
}

#[derive(Debug, Default)]
struct SyncFlags {
    seeded: bool,
    joined: bool,
    was_joined: bool,
    channel_gone: bool,
    closed: bool,
}

impl SyncFlags {
    fn state(&self) -> SyncState {
        if self.closed {
            SyncState::NoSession
        } else if self.joined && self.seeded {
            SyncState::Synced
        } else if !self.joined && (self.was_joined || self.channel_gone) {
            SyncState::Degraded
        } else {
            SyncState::Connecting
        }
    }
}

#[derive(Clone)]
struct StateTracker {
    actor_id: ActorId,
    flags: Arc<Mutex<SyncFlags>>,
    state: Arc<watch::Sender<SyncState>>,
}

impl StateTracker {
    fn new(actor_id: ActorId) -> Self {
        let (state, _) = watch::channel(SyncState::Connecting);
        Self {
            actor_id,
            flags: Arc::new(Mutex::new(SyncFlags::default())),
            state: Arc::new(state),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut SyncFlags)) {
        let next = match self.flags.lock() {
            Ok(mut flags) => {
                apply(&mut flags);
                flags.state()
            }
            Err(_) => return,
        };
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::info!(
                event = "sync_state",
                actor_id = %self.actor_id,
                state = ?next,
                "notification sync state changed"
            );
        }
    }

    fn current(&self) -> SyncState {
        *self.state.borrow()
    }
}

/// Builds notification sessions from resolved identities.
#[derive(Clone)]
pub struct NotificationService {
    api: Arc<dyn NotificationApi>,
    channels: ChannelRegistry,
    push: PushSubscriptionManager,
    alerts: Arc<dyn AlertSink>,
    policy: DuplicatePolicy,
}

impl NotificationService {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        channels: ChannelRegistry,
        push: PushSubscriptionManager,
        alerts: Arc<dyn AlertSink>,
        policy: DuplicatePolicy,
    ) -> Self {
        Self {
            api,
            channels,
            push,
            alerts,
            policy,
        }
    }

    /// Wires the HTTP client and WebSocket transport described by `config`.
    pub fn from_config(
        config: &Config,
        platform: Arc<dyn PushPlatform>,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, ConfigError> {
        let endpoints = config.endpoints();
        let api: Arc<dyn NotificationApi> = Arc::new(
            HttpNotificationClient::new(&endpoints.api, config.http_timeout())
                .map_err(|err| ConfigError::Invalid(err.to_string()))?,
        );
        let transport = WebSocketTransport::new(&endpoints.socket)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        let options = config
            .realtime
            .as_ref()
            .map(ChannelOptions::from)
            .unwrap_or_default();
        let channels = ChannelRegistry::new(Arc::new(transport), options);
        let push_config = config.push.clone().unwrap_or_default();
        let push = PushSubscriptionManager::new(platform, Arc::clone(&api), &push_config)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(Self::new(
            api,
            channels,
            push,
            alerts,
            DuplicatePolicy::from_dedupe(config.dedupe_notifications()),
        ))
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Starts syncing for the actor found in `source`. Returns `None`, and
    /// opens nothing, when there is no session.
    pub async fn start_session(
        &self,
        source: Arc<dyn SessionSource>,
    ) -> Option<NotificationSession> {
        let identity = IdentityResolver::new(source);
        let Some(actor_id) = identity.resolve_actor_id() else {
            tracing::debug!(
                event = "sync_skipped",
                reason = "no_session",
                "no actor identity; realtime sync not started"
            );
            return None;
        };

        let store = NotificationStore::new(self.policy);
        let tracker = StateTracker::new(actor_id.clone());
        let cancel = CancellationToken::new();
        let handle = self.channels.connect(&actor_id);
        let pump = tokio::spawn(pump_events(
            handle,
            store.clone(),
            Arc::clone(&self.alerts),
            tracker.clone(),
            cancel.clone(),
        ));

        let session = NotificationSession {
            actor_id,
            identity,
            store,
            api: Arc::clone(&self.api),
            push: self.push.clone(),
            tracker,
            cancel,
            pump: Some(pump),
        };
        let _ = session.refresh().await;
        Some(session)
    }
}

/// Notification state for one signed-in actor. Dropping or closing the
/// session releases its realtime subscription.
pub struct NotificationSession {
    actor_id: ActorId,
    identity: IdentityResolver,
    store: NotificationStore,
    api: Arc<dyn NotificationApi>,
    push: PushSubscriptionManager,
    tracker: StateTracker,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl NotificationSession {
    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub fn notifications(&self) -> NotificationsView {
        self.store.view()
    }

    pub fn state(&self) -> SyncState {
        self.tracker.current()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.tracker.state.subscribe()
    }

    /// Replaces local state with the server snapshot. On failure the
    /// current notifications are kept as they are.
    pub async fn refresh(&self) -> SyncResult<()> {
        let token = self.identity.auth_token();
        match self.api.fetch_snapshot(token.as_deref()).await {
            Ok(snapshot) => {
                tracing::debug!(
                    event = "notification_snapshot",
                    actor_id = %self.actor_id,
                    notifications = snapshot.notifications.len(),
                    unread = snapshot.unread_count,
                    "notification snapshot seeded"
                );
                self.store.seed_snapshot(snapshot);
                self.tracker.update(|flags| flags.seeded = true);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    event = "notification_fetch_failed",
                    actor_id = %self.actor_id,
                    kind = err.kind(),
                    error = %err,
                    "failed to fetch notifications"
                );
                Err(err)
            }
        }
    }

    /// Marks a notification read on the server, then locally. A failed
    /// server call leaves the store untouched.
    pub async fn mark_as_read(&self, id: &str) -> SyncResult<()> {
        let token = self.identity.auth_token();
        match self.api.mark_read(id, token.as_deref()).await {
            Ok(()) => {
                self.store.mark_read(id);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    event = "notification_mark_read_failed",
                    actor_id = %self.actor_id,
                    notification_id = %id,
                    kind = err.kind(),
                    error = %err,
                    "failed to mark notification as read"
                );
                Err(err)
            }
        }
    }

    pub async fn subscribe_to_push(&self) -> Result<(), PushError> {
        let token = self.identity.auth_token();
        self.push.subscribe(token.as_deref()).await
    }

    /// Logout: stops realtime delivery and discards local state.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        self.store.clear();
        self.tracker.update(|flags| flags.closed = true);
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn pump_events(
    mut handle: ChannelHandle,
    store: NotificationStore,
    alerts: Arc<dyn AlertSink>,
    tracker: StateTracker,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = handle.recv() => event,
        };
        let Some(event) = event else {
            tracker.update(|flags| {
                flags.joined = false;
                flags.channel_gone = true;
            });
            break;
        };
        match event {
            ChannelEvent::Notification(notification) => {
                if store.ingest(notification.clone()) {
                    alerts.alert(&notification);
                } else {
                    tracing::debug!(
                        event = "notification_duplicate",
                        actor_id = %handle.actor_id(),
                        notification_id = %notification.id,
                        "dropping redelivered notification"
                    );
                }
            }
            ChannelEvent::Joined { .. } => tracker.update(|flags| {
                flags.joined = true;
                flags.was_joined = true;
            }),
            ChannelEvent::Disconnected { .. } => tracker.update(|flags| flags.joined = false),
            ChannelEvent::Connecting { .. } | ChannelEvent::Connected | ChannelEvent::Closed => {}
        }
    }
    handle.close();
}
