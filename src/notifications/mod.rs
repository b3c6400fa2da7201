pub mod alerts;
pub mod client;
pub mod error;
pub mod service;
pub mod store;
pub mod types;

pub use alerts::{AlertSink, RecordingAlerts, TracingAlerts};
pub use client::{HttpNotificationClient, NotificationApi};
pub use error::{SyncError, SyncResult};
pub use service::{NotificationService, NotificationSession, SyncState};
pub use store::{DuplicatePolicy, NotificationStore, NotificationsView};
pub use types::{Notification, Snapshot};
