mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{StubApi, StubPlatform, WAIT, eventually, harness, harness_with, notification, signed_in};
use portal_notify::identity::{ActorId, MemorySessionStore};
use portal_notify::notifications::{Snapshot, SyncError, SyncState};
use portal_notify::push::{PushError, PushStep};

#[tokio::test]
async fn no_session_never_connects() {
    let mut h = harness(StubApi::default());

    let session = h
        .service
        .start_session(Arc::new(MemorySessionStore::new()))
        .await;

    assert!(session.is_none());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.transport.opens(), 0);
    assert!(h.server.try_recv().is_err());
    assert!(h.api.tokens.lock().unwrap().is_empty());
    assert!(!h.service.channels().is_connected(&ActorId::new("42").unwrap()));
}

#[tokio::test]
async fn snapshot_push_and_mark_read_flow() {
    let n1 = notification("n1", "T", "M", false);
    let n2 = notification("n2", "T2", "M2", false);
    let mut h = harness(StubApi::with_snapshot(Snapshot {
        notifications: vec![n1.clone()],
        unread_count: 1,
    }));

    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");
    let view = session.notifications();
    assert_eq!(view.notifications(), vec![n1.clone()]);
    assert_eq!(view.unread_count(), 1);
    assert_eq!(
        h.api.tokens.lock().unwrap().as_slice(),
        &[Some("test-token".to_string())]
    );

    let mut conn = tokio::time::timeout(WAIT, h.server.recv())
        .await
        .unwrap()
        .expect("connection");
    assert_eq!(conn.handshake().await.as_deref(), Some(r#"42["join","42"]"#));
    assert!(eventually(|| session.state() == SyncState::Synced).await);

    conn.send_notification(&n2);
    assert!(eventually(|| view.unread_count() == 2).await);
    let ids: Vec<_> = view
        .notifications()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, vec!["n2", "n1"]);
    let alerts = h.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].message, "M2");

    session.mark_as_read("n2").await.unwrap();
    assert!(view.get("n2").unwrap().read);
    assert!(!view.get("n1").unwrap().read);
    assert_eq!(view.unread_count(), 1);
    assert_eq!(*h.api.mark_read_calls.lock().unwrap(), vec!["n2".to_string()]);
}

#[tokio::test]
async fn failed_mark_read_leaves_store_unchanged() {
    let a = notification("a", "T", "M", false);
    let api = StubApi::with_snapshot(Snapshot {
        notifications: vec![a.clone()],
        unread_count: 1,
    });
    api.fail_mark_read(SyncError::Server {
        status: 500,
        message: "boom".to_string(),
    });
    let h = harness(api);
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");

    let err = session.mark_as_read("a").await.unwrap_err();
    assert!(matches!(err, SyncError::Server { status: 500, .. }));
    let view = session.notifications();
    assert_eq!(view.notifications(), vec![a]);
    assert_eq!(view.unread_count(), 1);
}

#[tokio::test]
async fn failed_refresh_keeps_last_snapshot() {
    let a = notification("a", "T", "M", false);
    let b = notification("b", "T", "M", false);
    let h = harness(StubApi::with_snapshot(Snapshot {
        notifications: vec![a.clone(), b.clone()],
        unread_count: 2,
    }));
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");

    h.api
        .set_snapshot(Err(SyncError::Network("connection refused".to_string())));
    assert!(matches!(
        session.refresh().await,
        Err(SyncError::Network(_))
    ));

    let view = session.notifications();
    assert_eq!(view.notifications(), vec![a, b]);
    assert_eq!(view.unread_count(), 2);
}

#[tokio::test]
async fn missing_token_is_an_auth_failure() {
    let session_state = MemorySessionStore::new();
    session_state.set("entrepriseId", "42");
    let api = StubApi::default();
    api.set_snapshot(Err(SyncError::missing_token()));
    let h = harness(api);

    let session = h
        .service
        .start_session(Arc::new(session_state))
        .await
        .expect("fallback id starts a session");
    assert_eq!(session.actor_id().as_str(), "42");
    assert_eq!(h.api.tokens.lock().unwrap().as_slice(), &[None]);
    assert!(matches!(session.refresh().await, Err(SyncError::Auth(_))));
    assert!(session.notifications().is_empty());
    assert_eq!(session.state(), SyncState::Connecting);
}

#[tokio::test]
async fn push_unsupported_leaves_store_untouched() {
    let a = notification("a", "T", "M", false);
    let h = harness(StubApi::with_snapshot(Snapshot {
        notifications: vec![a.clone()],
        unread_count: 1,
    }));
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");

    let result = session.subscribe_to_push().await;

    assert!(matches!(result, Err(PushError::UnsupportedPlatform)));
    assert_eq!(session.notifications().notifications(), vec![a]);
    assert_eq!(session.notifications().unread_count(), 1);
    assert!(h.api.registered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn push_subscription_is_sent_to_server() {
    let platform = Arc::new(StubPlatform::supported());
    let h = harness_with(StubApi::default(), platform.clone());
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");

    session.subscribe_to_push().await.unwrap();

    let registered = h.api.registered.lock().unwrap().clone();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].endpoint, "https://push.example.com/sub/1");
    let options = platform.last_options.lock().unwrap().clone().unwrap();
    assert!(options.user_visible_only);
    assert_eq!(options.application_server_key.len(), 65);
    assert_eq!(platform.unsubscribed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_server_registration_drops_platform_subscription() {
    let platform = Arc::new(StubPlatform::supported());
    let api = StubApi::default();
    api.fail_register(SyncError::Server {
        status: 503,
        message: "unavailable".to_string(),
    });
    let h = harness_with(api, platform.clone());
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");

    let err = session.subscribe_to_push().await.unwrap_err();

    assert_eq!(err.step(), Some(PushStep::ServerRegistration));
    assert_eq!(platform.subscribed.load(Ordering::SeqCst), 1);
    assert_eq!(platform.unsubscribed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn worker_failure_stops_before_subscribing() {
    let platform = Arc::new(StubPlatform {
        supported: true,
        fail_worker: true,
        ..Default::default()
    });
    let h = harness_with(StubApi::default(), platform.clone());
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");

    let err = session.subscribe_to_push().await.unwrap_err();

    assert_eq!(err.step(), Some(PushStep::WorkerRegistration));
    assert_eq!(platform.subscribed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn redelivered_notification_is_dropped() {
    let mut h = harness(StubApi::default());
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");
    let mut conn = tokio::time::timeout(WAIT, h.server.recv())
        .await
        .unwrap()
        .expect("connection");
    conn.handshake().await.expect("join");

    let pushed = notification("n1", "T", "M", false);
    conn.send_notification(&pushed);
    conn.send_notification(&pushed);
    conn.send_notification(&notification("n2", "T", "M", false));

    let view = session.notifications();
    assert!(eventually(|| view.notifications().len() == 2).await);
    assert_eq!(view.unread_count(), 2);
    assert_eq!(h.alerts.alerts().len(), 2);
}

#[tokio::test]
async fn reconnect_degrades_then_rejoins() {
    let mut h = harness(StubApi::default());
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");

    let mut first = tokio::time::timeout(WAIT, h.server.recv())
        .await
        .unwrap()
        .expect("first connection");
    assert_eq!(first.handshake().await.as_deref(), Some(r#"42["join","42"]"#));
    assert!(eventually(|| session.state() == SyncState::Synced).await);

    first.push("41");
    drop(first);
    assert!(eventually(|| session.state() == SyncState::Degraded).await);

    let mut second = tokio::time::timeout(WAIT, h.server.recv())
        .await
        .unwrap()
        .expect("second connection");
    assert_eq!(second.handshake().await.as_deref(), Some(r#"42["join","42"]"#));
    assert!(eventually(|| session.state() == SyncState::Synced).await);
    assert_eq!(h.transport.opens(), 2);

    second.send_notification(&notification("late", "T", "M", false));
    let view = session.notifications();
    assert!(eventually(|| view.unread_count() == 1).await);
}

#[tokio::test]
async fn sessions_for_one_actor_share_a_channel() {
    let mut h = harness(StubApi::default());
    let actor = ActorId::new("42").unwrap();

    let first = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("first");
    let mut conn = tokio::time::timeout(WAIT, h.server.recv())
        .await
        .unwrap()
        .expect("connection");
    conn.handshake().await.expect("join");
    assert!(eventually(|| first.state() == SyncState::Synced).await);
    assert!(h.service.channels().is_joined(&actor));

    let second = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("second");
    assert_eq!(h.service.channels().subscriber_count(&actor), 2);
    assert!(eventually(|| second.state() == SyncState::Synced).await);
    assert_eq!(h.transport.opens(), 1);

    conn.send_notification(&notification("shared", "T", "M", false));
    let first_view = first.notifications();
    let second_view = second.notifications();
    assert!(eventually(|| first_view.unread_count() == 1 && second_view.unread_count() == 1).await);

    first.close().await;
    assert_eq!(h.service.channels().subscriber_count(&actor), 1);
    assert!(h.service.channels().is_connected(&actor));

    let mut state = second.watch_state();
    second.close().await;
    assert!(!h.service.channels().is_connected(&actor));
    assert_eq!(*state.borrow_and_update(), SyncState::NoSession);
    assert!(second_view.is_empty());
    assert_eq!(h.transport.opens(), 1);
}

#[tokio::test]
async fn pushed_payload_with_both_id_keys_is_ingested() {
    let mut h = harness(StubApi::default());
    let session = h
        .service
        .start_session(Arc::new(signed_in("42")))
        .await
        .expect("session");
    let mut conn = tokio::time::timeout(WAIT, h.server.recv())
        .await
        .unwrap()
        .expect("connection");
    conn.handshake().await.expect("join");

    conn.push(r#"42["notification",{"_id":"n7","id":"n7","title":"T","message":"M","read":false}]"#);

    let view = session.notifications();
    assert!(eventually(|| view.unread_count() == 1).await);
    assert_eq!(view.notifications()[0].id, "n7");
}
