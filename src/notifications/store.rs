use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::notifications::types::{Notification, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Drop a pushed notification whose id is already held.
    Skip,
    /// Keep every delivery, including redeliveries after reconnect.
    Accept,
}

impl DuplicatePolicy {
    pub fn from_dedupe(dedupe: bool) -> Self {
        if dedupe {
            DuplicatePolicy::Skip
        } else {
            DuplicatePolicy::Accept
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    notifications: Vec<Notification>,
    unread_count: usize,
}

/// Newest-first notifications plus a cached unread counter.
///
/// The counter is maintained incrementally and only reset by [`seed`]; it is
/// not recomputed from the list.
///
/// [`seed`]: NotificationStore::seed
#[derive(Debug, Clone)]
pub struct NotificationStore {
    state: Arc<Mutex<StoreState>>,
    changes: Arc<watch::Sender<u64>>,
    policy: DuplicatePolicy,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(DuplicatePolicy::Skip)
    }
}

impl NotificationStore {
    pub fn new(policy: DuplicatePolicy) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            changes: Arc::new(changes),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn seed(&self, notifications: Vec<Notification>, unread_count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.notifications = notifications;
            state.unread_count = unread_count;
        }
        self.bump();
    }

    pub fn seed_snapshot(&self, snapshot: Snapshot) {
        self.seed(snapshot.notifications, snapshot.unread_count);
    }

    /// Prepends a pushed notification and counts it as unread. Returns
    /// `false` when the notification was dropped as a duplicate.
    pub fn ingest(&self, notification: Notification) -> bool {
        let inserted = match self.state.lock() {
            Ok(mut state) => {
                let duplicate = self.policy == DuplicatePolicy::Skip
                    && state
                        .notifications
                        .iter()
                        .any(|existing| existing.id == notification.id);
                if duplicate {
                    false
                } else {
                    state.notifications.insert(0, notification);
                    state.unread_count = state.unread_count.saturating_add(1);
                    true
                }
            }
            Err(_) => false,
        };
        if inserted {
            self.bump();
        }
        inserted
    }

    /// Marks `id` read and decrements the counter, floored at zero. The
    /// counter is cached and only a snapshot reconciles it, so every call
    /// decrements, whether or not the record is held or already read.
    /// Returns whether anything changed.
    pub fn mark_read(&self, id: &str) -> bool {
        let changed = match self.state.lock() {
            Ok(mut guard) => {
                let state = &mut *guard;
                let mut changed = false;
                if let Some(notification) = state
                    .notifications
                    .iter_mut()
                    .find(|notification| notification.id == id)
                    && !notification.read
                {
                    notification.read = true;
                    changed = true;
                }
                if state.unread_count > 0 {
                    state.unread_count -= 1;
                    changed = true;
                }
                changed
            }
            Err(_) => false,
        };
        if changed {
            self.bump();
        }
        changed
    }

    pub fn clear(&self) {
        self.seed(Vec::new(), 0);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state
            .lock()
            .map(|state| state.notifications.clone())
            .unwrap_or_default()
    }

    pub fn unread_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.unread_count)
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.state
            .lock()
            .ok()?
            .notifications
            .iter()
            .find(|notification| notification.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.notifications.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn view(&self) -> NotificationsView {
        NotificationsView {
            store: self.clone(),
        }
    }

    fn bump(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}

/// Read-only handle given to UI consumers.
#[derive(Debug, Clone)]
pub struct NotificationsView {
    store: NotificationStore,
}

impl NotificationsView {
    pub fn notifications(&self) -> Vec<Notification> {
        self.store.notifications()
    }

    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.store.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Yields a new version number after every store mutation.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.store.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::{DuplicatePolicy, NotificationStore};
    use crate::notifications::types::Notification;

    fn notification(id: &str, read: bool) -> Notification {
        Notification {
            id: id.to_string(),
            title: None,
            message: format!("message {id}"),
            read,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn duplicate_ids_are_dropped_by_default() {
        let store = NotificationStore::default();
        assert!(store.ingest(notification("n1", false)));
        assert!(!store.ingest(notification("n1", false)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn accept_policy_keeps_redeliveries() {
        let store = NotificationStore::new(DuplicatePolicy::Accept);
        store.ingest(notification("n1", false));
        store.ingest(notification("n1", false));
        assert_eq!(store.len(), 2);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn mark_read_on_read_record_still_decrements() {
        let store = NotificationStore::default();
        store.seed(vec![notification("a", true), notification("b", false)], 2);
        assert!(store.mark_read("a"));
        assert_eq!(store.unread_count(), 1);
        assert!(store.mark_read("b"));
        assert_eq!(store.unread_count(), 0);
        assert!(store.get("b").unwrap().read);
        assert!(!store.mark_read("a"));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn mark_read_unknown_id_decrements() {
        let store = NotificationStore::default();
        store.seed(vec![notification("a", false)], 3);
        assert!(store.mark_read("elsewhere"));
        assert_eq!(store.unread_count(), 2);
        assert!(!store.get("a").unwrap().read);
    }

    #[test]
    fn view_reports_changes() {
        let store = NotificationStore::default();
        let view = store.view();
        let mut changes = view.subscribe_changes();
        store.ingest(notification("n1", false));
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 1);
        assert_eq!(view.unread_count(), 1);
    }
}
