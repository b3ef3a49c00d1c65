//! Notification cache module
//!
//! In-memory ordered mirror of the user's notifications, kept consistent
//! with server-pushed snapshots and incremental pushes. Read-flag changes
//! are optimistic: they apply locally first and go to the backend as
//! fire-and-forget commands, with a future snapshot reconciling any
//! divergence.

use crate::chime::Chime;
use crate::connection::{BestEffort, Connection};
use crate::protocol::{topics, MarkAllRead, MarkNotificationRead, Notification};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// How long the new-notification pulse stays high for UI bell animations
const PULSE_DURATION: Duration = Duration::from_secs(3);

/// Ordered, observable collection of the user's notifications.
///
/// Most-recent-first ordering is established by sorting snapshots on
/// created-at descending and maintained by prepending incremental pushes.
pub struct NotificationCache {
    connection: Connection,
    chime: Arc<dyn Chime>,
    device: String,
    list: watch::Sender<Vec<Notification>>,
    unread: watch::Sender<usize>,
    pulse: Arc<watch::Sender<bool>>,
    fully_loaded: AtomicBool,
}

impl NotificationCache {
    /// Create a cache publishing read-commands through the given connection.
    ///
    /// `device` tags outbound mark-read commands with this client instance.
    pub fn new(connection: Connection, chime: Arc<dyn Chime>, device: impl Into<String>) -> Self {
        let (list, _) = watch::channel(Vec::new());
        let (unread, _) = watch::channel(0);
        let (pulse, _) = watch::channel(false);
        let pulse = Arc::new(pulse);
        Self {
            connection,
            chime,
            device: device.into(),
            list,
            unread,
            pulse,
            fully_loaded: AtomicBool::new(false),
        }
    }

    /// Replace the full collection with a server snapshot.
    ///
    /// Sorts by created-at descending, marks the cache fully loaded and
    /// recomputes the unread count. Idempotent: the same snapshot twice
    /// yields the same state.
    pub fn load_snapshot(&self, mut snapshot: Vec<Notification>) {
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let count = snapshot.len();
        self.list.send_replace(snapshot);
        self.fully_loaded.store(true, Ordering::Release);
        self.recompute_unread();
        debug!(count, "Loaded notification snapshot");
    }

    /// Add one pushed notification.
    ///
    /// A duplicate identifier is discarded, not merged. New entries are
    /// prepended, the unread count is recomputed, and two side effects
    /// fire: a best-effort chime and a transient pulse for bell icons.
    pub fn add_notification(&self, notification: Notification) {
        if self
            .list
            .borrow()
            .iter()
            .any(|existing| existing.id == notification.id)
        {
            debug!(id = notification.id, "Discarding duplicate notification");
            return;
        }

        info!(id = notification.id, "New notification received");
        self.list
            .send_modify(|list| list.insert(0, notification));
        self.recompute_unread();
        self.chime.play();

        self.pulse.send_replace(true);
        let pulse = Arc::clone(&self.pulse);
        tokio::spawn(async move {
            tokio::time::sleep(PULSE_DURATION).await;
            pulse.send_replace(false);
        });
    }

    /// Optimistically flag one notification read and tell the backend.
    ///
    /// An unknown identifier is a silent no-op, as is an entry that is
    /// already read. No rollback happens if the command is dropped.
    pub async fn mark_as_read(&self, id: i64) -> BestEffort {
        let mut flipped = false;
        self.list.send_modify(|list| {
            if let Some(entry) = list.iter_mut().find(|n| n.id == id && !n.is_read) {
                entry.is_read = true;
                flipped = true;
            }
        });
        if !flipped {
            return BestEffort::Dropped;
        }
        self.recompute_unread();

        let command = MarkNotificationRead {
            notification_id: id,
            device: self.device.clone(),
        };
        self.connection
            .publish(topics::NOTIFICATION_READ, &command)
            .await
    }

    /// Optimistically flag every notification read and tell the backend
    /// with a single command
    pub async fn mark_all_as_read(&self) -> BestEffort {
        self.list.send_modify(|list| {
            for entry in list.iter_mut() {
                entry.is_read = true;
            }
        });
        self.unread.send_replace(0);

        let command = MarkAllRead {
            device: self.device.clone(),
        };
        self.connection
            .publish(topics::NOTIFICATION_READ_ALL, &command)
            .await
    }

    /// Synchronous snapshot of the current collection
    pub fn current(&self) -> Vec<Notification> {
        self.list.borrow().clone()
    }

    /// Synchronous unread count
    pub fn current_unread_count(&self) -> usize {
        *self.unread.borrow()
    }

    /// Whether a full snapshot has been applied since the last reset
    pub fn is_fully_loaded(&self) -> bool {
        self.fully_loaded.load(Ordering::Acquire)
    }

    /// Subscribe to collection changes
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.list.subscribe()
    }

    /// Subscribe to unread count changes
    pub fn subscribe_unread(&self) -> watch::Receiver<usize> {
        self.unread.subscribe()
    }

    /// Subscribe to the transient new-notification pulse
    pub fn subscribe_pulse(&self) -> watch::Receiver<bool> {
        self.pulse.subscribe()
    }

    /// Drop all local state; called on session end
    pub fn reset(&self) {
        self.list.send_replace(Vec::new());
        self.unread.send_replace(0);
        self.pulse.send_replace(false);
        self.fully_loaded.store(false, Ordering::Release);
        debug!("Notification cache reset");
    }

    fn recompute_unread(&self) {
        let count = self.list.borrow().iter().filter(|n| !n.is_read).count();
        self.unread.send_replace(count);
    }
}
