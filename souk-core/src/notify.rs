use async_trait::async_trait;
use souk_shared::Notification;

/// Transport that pushes a persisted notification to its recipient.
///
/// Delivery is best effort: callers log failures and move on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Sink that only writes to the trace log.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            user_id = notification.user_id,
            category = notification.category.as_str(),
            "notification {}: {}",
            notification.id,
            notification.message
        );
        Ok(())
    }
}
