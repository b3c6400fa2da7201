use std::sync::{Arc, Mutex};

use crate::notifications::types::Notification;

/// Transient user-facing alert raised for each pushed notification.
/// Delivery is fire-and-forget: no retry, no acknowledgement.
pub trait AlertSink: Send + Sync {
    fn alert(&self, notification: &Notification);
}

#[derive(Debug, Default, Clone)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn alert(&self, notification: &Notification) {
        tracing::info!(
            event = "notification_alert",
            notification_id = %notification.id,
            title = %notification.display_title(),
            "{}",
            notification.message
        );
    }
}

/// Keeps every alert in memory, for embedders that render their own toasts
/// and for tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingAlerts {
    alerts: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Notification> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.alerts
            .lock()
            .map(|mut alerts| std::mem::take(&mut *alerts))
            .unwrap_or_default()
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, notification: &Notification) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(notification.clone());
        }
    }
}
