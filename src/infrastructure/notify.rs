use crate::domain::events::{Notification, NotificationKind};
use crate::domain::ports::Notifier;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Hands notifications to a background task over a bounded channel.
///
/// `notify` never waits: when the channel is full or the dispatcher is gone
/// the notification is dropped and a warning is logged.
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    /// Spawns the dispatcher task. The task ends once every sender is dropped.
    pub fn spawn(buffer: usize) -> (Self, JoinHandle<usize>) {
        let (tx, mut rx) = mpsc::channel::<Notification>(buffer.max(1));
        let handle = tokio::spawn(async move {
            let mut delivered = 0;
            while let Some(notification) = rx.recv().await {
                match serde_json::to_string(&notification) {
                    Ok(payload) => info!(target: "orderledger::notify", %payload, "notification"),
                    Err(err) => warn!(error = %err, "unserializable notification"),
                }
                delivered += 1;
            }
            delivered
        });
        (Self { tx }, handle)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                warn!(kind = ?n.kind, "notification queue full, dropping");
            }
            Err(TrySendError::Closed(n)) => {
                warn!(kind = ?n.kind, "notification dispatcher stopped, dropping");
            }
        }
    }
}

/// Keeps every notification in memory. Used by tests.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.notifications().into_iter().map(|n| n.kind).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}
