use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use portal_notify::config::Config;
use portal_notify::identity::FileSessionStore;
use portal_notify::notifications::{NotificationService, TracingAlerts};
use portal_notify::push::{ConfiguredPushPlatform, PushPlatform, UnsupportedPushPlatform};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PORTAL_NOTIFY_CONFIG").ok());
    let config = match config_path {
        Some(path) => Config::load(&path).with_context(|| format!("loading {path}"))?,
        None => Config::default(),
    }
    .with_env_overrides();
    init_tracing(&config);

    let platform: Arc<dyn PushPlatform> = match config.push.as_ref() {
        Some(push) if push.endpoint.is_some() => Arc::new(ConfiguredPushPlatform::from_config(push)),
        _ => Arc::new(UnsupportedPushPlatform),
    };
    let service = NotificationService::from_config(&config, platform, Arc::new(TracingAlerts))?;
    let sessions = FileSessionStore::new(config.session_path());

    let Some(session) = service.start_session(Arc::new(sessions)).await else {
        tracing::info!(
            event = "no_session",
            path = %config.session_path().display(),
            "no signed-in actor; nothing to follow"
        );
        return Ok(());
    };

    let view = session.notifications();
    tracing::info!(
        event = "session_started",
        actor_id = %session.actor_id(),
        notifications = view.notifications().len(),
        unread = view.unread_count(),
        "following notifications"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;

    println!("{} unread notification(s)", view.unread_count());
    session.close().await;
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
