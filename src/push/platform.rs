use async_trait::async_trait;

use crate::config::PushConfig;
use crate::push::subscription::{
    PushSubscription, SubscribeOptions, SubscriptionKeys, WorkerRegistration,
};

/// Host push facility: background worker registration plus the push
/// service that issues subscriptions.
#[async_trait]
pub trait PushPlatform: Send + Sync {
    fn is_supported(&self) -> bool;
    async fn register_worker(&self, script_path: &str) -> anyhow::Result<WorkerRegistration>;
    async fn subscribe(
        &self,
        registration: &WorkerRegistration,
        options: SubscribeOptions,
    ) -> anyhow::Result<PushSubscription>;
    async fn unsubscribe(&self, subscription: &PushSubscription) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct UnsupportedPushPlatform;

#[async_trait]
impl PushPlatform for UnsupportedPushPlatform {
    fn is_supported(&self) -> bool {
        false
    }

    async fn register_worker(&self, _script_path: &str) -> anyhow::Result<WorkerRegistration> {
        anyhow::bail!("push workers are not available")
    }

    async fn subscribe(
        &self,
        _registration: &WorkerRegistration,
        _options: SubscribeOptions,
    ) -> anyhow::Result<PushSubscription> {
        anyhow::bail!("push service is not available")
    }

    async fn unsubscribe(&self, _subscription: &PushSubscription) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hands out an endpoint and key pair provisioned out of band, for hosts
/// where an external distributor owns the push connection.
#[derive(Debug, Clone)]
pub struct ConfiguredPushPlatform {
    subscription: Option<PushSubscription>,
}

impl ConfiguredPushPlatform {
    pub fn from_config(config: &PushConfig) -> Self {
        let subscription = match (&config.endpoint, &config.p256dh, &config.auth) {
            (Some(endpoint), Some(p256dh), Some(auth))
                if !endpoint.trim().is_empty()
                    && !p256dh.trim().is_empty()
                    && !auth.trim().is_empty() =>
            {
                Some(PushSubscription {
                    endpoint: endpoint.trim().to_string(),
                    expiration_time: None,
                    keys: SubscriptionKeys {
                        p256dh: p256dh.trim().to_string(),
                        auth: auth.trim().to_string(),
                    },
                })
            }
            _ => None,
        };
        Self { subscription }
    }
}

#[async_trait]
impl PushPlatform for ConfiguredPushPlatform {
    fn is_supported(&self) -> bool {
        self.subscription.is_some()
    }

    async fn register_worker(&self, script_path: &str) -> anyhow::Result<WorkerRegistration> {
        if !script_path.starts_with('/') {
            anyhow::bail!("worker script path must be absolute: {script_path}");
        }
        let scope = match script_path.rfind('/') {
            Some(idx) => script_path[..=idx].to_string(),
            None => "/".to_string(),
        };
        Ok(WorkerRegistration {
            script_path: script_path.to_string(),
            scope,
        })
    }

    async fn subscribe(
        &self,
        _registration: &WorkerRegistration,
        options: SubscribeOptions,
    ) -> anyhow::Result<PushSubscription> {
        if options.application_server_key.is_empty() {
            anyhow::bail!("missing application server key");
        }
        self.subscription
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no push endpoint configured"))
    }

    async fn unsubscribe(&self, subscription: &PushSubscription) -> anyhow::Result<()> {
        tracing::debug!(
            event = "push_unsubscribe",
            endpoint = %subscription.endpoint,
            "configured endpoint left to its distributor"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfiguredPushPlatform, PushPlatform};
    use crate::config::PushConfig;

    #[tokio::test]
    async fn configured_platform_needs_full_key_set() {
        let partial = ConfiguredPushPlatform::from_config(&PushConfig {
            endpoint: Some("https://push.example.com/abc".to_string()),
            ..Default::default()
        });
        assert!(!partial.is_supported());

        let full = ConfiguredPushPlatform::from_config(&PushConfig {
            endpoint: Some("https://push.example.com/abc".to_string()),
            p256dh: Some("BPk".to_string()),
            auth: Some("xyz".to_string()),
            ..Default::default()
        });
        assert!(full.is_supported());
        let registration = full.register_worker("/sw.js").await.unwrap();
        assert_eq!(registration.scope, "/");
        assert!(full.register_worker("sw.js").await.is_err());
    }
}
