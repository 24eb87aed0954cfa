use async_trait::async_trait;
use log::info;
use serde_json::Value;

use crate::PrimaryKey;

/// A notification about to be dispatched to a user
#[derive(Debug)]
pub struct NewNotification {
    pub user_id: PrimaryKey,
    /// Stable notification kind, e.g. "game-invite"
    pub kind: &'static str,
    pub title: String,
    pub message: String,
    pub data: Value,
}

/// The seam to the external notification service.
///
/// Injected into the managers at construction so neither side depends on
/// the other. Delivery is best-effort: implementations must swallow their
/// own failures, a notification never aborts the state change it reports.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn create_notification(&self, notification: NewNotification);
}

/// A notifier that only writes to the log. Used in tests and as a stand-in
/// until a real dispatcher is wired up.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn create_notification(&self, notification: NewNotification) {
        info!(
            "Notification for user {}: [{}] {}",
            notification.user_id, notification.kind, notification.title
        );
    }
}
