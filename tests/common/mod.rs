#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use portal_notify::config::PushConfig;
use portal_notify::identity::MemorySessionStore;
use portal_notify::notifications::{
    DuplicatePolicy, Notification, NotificationApi, NotificationService, RecordingAlerts,
    Snapshot, SyncError, SyncResult,
};
use portal_notify::push::subscription::{
    PushSubscription, SubscribeOptions, SubscriptionKeys, WorkerRegistration,
};
use portal_notify::push::{PushPlatform, PushSubscriptionManager, UnsupportedPushPlatform};
use portal_notify::realtime::{
    ChannelError, ChannelOptions, ChannelRegistry, RealtimeConnection, RealtimeTransport,
};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn notification(id: &str, title: &str, message: &str, read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        title: Some(title.to_string()),
        message: message.to_string(),
        read,
        created_at: chrono::Utc::now(),
    }
}

pub fn signed_in(actor: &str) -> MemorySessionStore {
    let store = MemorySessionStore::new();
    store.set("user", format!(r#"{{"id":"{actor}"}}"#));
    store.set("token", "test-token");
    store
}

/// Polls `check` until it holds or the wait budget runs out.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[derive(Default)]
pub struct StubApi {
    pub snapshot: Mutex<Option<SyncResult<Snapshot>>>,
    pub mark_read_result: Mutex<Option<SyncError>>,
    pub register_result: Mutex<Option<SyncError>>,
    pub mark_read_calls: Mutex<Vec<String>>,
    pub registered: Mutex<Vec<PushSubscription>>,
    pub tokens: Mutex<Vec<Option<String>>>,
}

impl StubApi {
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let api = Self::default();
        api.set_snapshot(Ok(snapshot));
        api
    }

    pub fn set_snapshot(&self, result: SyncResult<Snapshot>) {
        *self.snapshot.lock().unwrap() = Some(result);
    }

    pub fn fail_mark_read(&self, err: SyncError) {
        *self.mark_read_result.lock().unwrap() = Some(err);
    }

    pub fn fail_register(&self, err: SyncError) {
        *self.register_result.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl NotificationApi for StubApi {
    async fn fetch_snapshot(&self, token: Option<&str>) -> SyncResult<Snapshot> {
        self.tokens.lock().unwrap().push(token.map(str::to_string));
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Snapshot::default()))
    }

    async fn mark_read(&self, id: &str, _token: Option<&str>) -> SyncResult<()> {
        self.mark_read_calls.lock().unwrap().push(id.to_string());
        match self.mark_read_result.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn register_push_subscription(
        &self,
        subscription: &PushSubscription,
        _token: Option<&str>,
    ) -> SyncResult<()> {
        if let Some(err) = self.register_result.lock().unwrap().clone() {
            return Err(err);
        }
        self.registered.lock().unwrap().push(subscription.clone());
        Ok(())
    }
}

/// Server half of one in-memory connection.
pub struct ServerConn {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerConn {
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(frame.into());
    }

    pub async fn next_frame(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    /// Runs the open/connect handshake and returns the join frame the
    /// client sent.
    pub async fn handshake(&mut self) -> Option<String> {
        self.push(r#"0{"sid":"mem","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#);
        let connect = self.next_frame().await?;
        assert_eq!(connect, "40");
        self.push(r#"40{"sid":"mem-socket"}"#);
        self.next_frame().await
    }

    pub fn send_notification(&self, notification: &Notification) {
        let payload = serde_json::to_string(notification).unwrap();
        self.push(format!(r#"42["notification",{payload}]"#));
    }
}

#[derive(Clone)]
pub struct MemoryTransport {
    opens: Arc<AtomicUsize>,
    accepted: mpsc::UnboundedSender<ServerConn>,
}

impl MemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerConn>) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        (
            Self {
                opens: Arc::new(AtomicUsize::new(0)),
                accepted,
            },
            incoming,
        )
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeTransport for MemoryTransport {
    async fn open(&self) -> Result<Box<dyn RealtimeConnection>, ChannelError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerConn {
                to_client,
                from_client,
            })
            .map_err(|_| ChannelError::Connect("no server listening".to_string()))?;
        Ok(Box::new(MemoryConnection {
            outbound: client_tx,
            inbound: client_rx,
        }))
    }
}

struct MemoryConnection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl RealtimeConnection for MemoryConnection {
    async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        self.outbound
            .send(frame)
            .map_err(|_| ChannelError::Transport("server gone".to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

#[derive(Default)]
pub struct StubPlatform {
    pub supported: bool,
    pub fail_worker: bool,
    pub subscribed: AtomicUsize,
    pub unsubscribed: AtomicUsize,
    pub last_options: Mutex<Option<SubscribeOptions>>,
}

impl StubPlatform {
    pub fn supported() -> Self {
        Self {
            supported: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl PushPlatform for StubPlatform {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn register_worker(&self, script_path: &str) -> anyhow::Result<WorkerRegistration> {
        if self.fail_worker {
            anyhow::bail!("worker script missing");
        }
        Ok(WorkerRegistration {
            script_path: script_path.to_string(),
            scope: "/".to_string(),
        })
    }

    async fn subscribe(
        &self,
        _registration: &WorkerRegistration,
        options: SubscribeOptions,
    ) -> anyhow::Result<PushSubscription> {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options);
        Ok(PushSubscription {
            endpoint: "https://push.example.com/sub/1".to_string(),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh: "p256dh-key".to_string(),
                auth: "auth-secret".to_string(),
            },
        })
    }

    async fn unsubscribe(&self, _subscription: &PushSubscription) -> anyhow::Result<()> {
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn fast_options() -> ChannelOptions {
    ChannelOptions {
        base_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(20),
        max_attempts: None,
        event_buffer: 64,
    }
}

pub struct Harness {
    pub api: Arc<StubApi>,
    pub transport: MemoryTransport,
    pub server: mpsc::UnboundedReceiver<ServerConn>,
    pub alerts: RecordingAlerts,
    pub service: NotificationService,
}

pub fn harness(api: StubApi) -> Harness {
    harness_with(api, Arc::new(UnsupportedPushPlatform))
}

pub fn harness_with(api: StubApi, platform: Arc<dyn PushPlatform>) -> Harness {
    let api = Arc::new(api);
    let (transport, server) = MemoryTransport::new();
    let alerts = RecordingAlerts::new();
    let channels = ChannelRegistry::new(Arc::new(transport.clone()), fast_options());
    let push = PushSubscriptionManager::new(
        platform,
        Arc::clone(&api) as Arc<dyn NotificationApi>,
        &PushConfig::default(),
    )
    .unwrap();
    let service = NotificationService::new(
        Arc::clone(&api) as Arc<dyn NotificationApi>,
        channels,
        push,
        Arc::new(alerts.clone()),
        DuplicatePolicy::Skip,
    );
    Harness {
        api,
        transport,
        server,
        alerts,
        service,
    }
}
