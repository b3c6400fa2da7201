use std::sync::Arc;

use crate::config::PushConfig;
use crate::notifications::client::NotificationApi;
use crate::push::error::{PushError, PushStep};
use crate::push::key::{ApplicationServerKey, KeyError};
use crate::push::platform::PushPlatform;
use crate::push::subscription::SubscribeOptions;

#[derive(Clone)]
pub struct PushSubscriptionManager {
    platform: Arc<dyn PushPlatform>,
    api: Arc<dyn NotificationApi>,
    server_key: ApplicationServerKey,
    worker_path: String,
    unsubscribe_on_failure: bool,
}

impl PushSubscriptionManager {
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        api: Arc<dyn NotificationApi>,
        config: &PushConfig,
    ) -> Result<Self, KeyError> {
        Ok(Self {
            platform,
            api,
            server_key: ApplicationServerKey::from_base64(config.vapid_public_key())?,
            worker_path: config.worker_path().to_string(),
            unsubscribe_on_failure: config.unsubscribe_on_failure(),
        })
    }

    /// Registers the background worker, obtains a platform subscription and
    /// hands it to the server. Every failure is logged here; nothing is kept
    /// client-side.
    pub async fn subscribe(&self, token: Option<&str>) -> Result<(), PushError> {
        let result = self.run(token).await;
        match &result {
            Ok(()) => tracing::info!(event = "push_subscribed", "push subscription registered"),
            Err(err) => tracing::warn!(
                event = "push_subscription_failed",
                step = ?err.step(),
                error = %err,
                "push subscription failed"
            ),
        }
        result
    }

    async fn run(&self, token: Option<&str>) -> Result<(), PushError> {
        if !self.platform.is_supported() {
            return Err(PushError::UnsupportedPlatform);
        }
        let registration = self
            .platform
            .register_worker(&self.worker_path)
            .await
            .map_err(|err| PushError::at(PushStep::WorkerRegistration, err))?;
        let subscription = self
            .platform
            .subscribe(
                &registration,
                SubscribeOptions {
                    user_visible_only: true,
                    application_server_key: self.server_key.as_bytes().to_vec(),
                },
            )
            .await
            .map_err(|err| PushError::at(PushStep::PlatformSubscribe, err))?;

        if let Err(err) = self.api.register_push_subscription(&subscription, token).await {
            if self.unsubscribe_on_failure
                && let Err(cleanup) = self.platform.unsubscribe(&subscription).await
            {
                tracing::warn!(
                    event = "push_orphaned",
                    endpoint = %subscription.endpoint,
                    error = %cleanup,
                    "platform subscription left without a server record"
                );
            }
            return Err(PushError::at(PushStep::ServerRegistration, err));
        }
        Ok(())
    }
}
