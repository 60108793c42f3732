use souk_core::notify::NotificationSink;
use souk_core::repository::MarketTx;
use souk_core::CoreResult;
use souk_shared::{NewNotification, Notification};
use std::sync::Arc;
use tracing::{debug, warn};

/// Notifications written inside a transaction, waiting for it to commit.
#[derive(Debug, Default)]
pub struct Pending {
    notifications: Vec<Notification>,
}

impl Pending {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&mut self, tx: &mut dyn MarketTx, notification: NewNotification) -> CoreResult<()> {
        let stored = tx.insert_notification(&notification).await?;
        self.notifications.push(stored);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Hands committed notifications to the transport. Never fails the caller.
#[derive(Clone)]
pub struct Outbox {
    sink: Arc<dyn NotificationSink>,
}

impl Outbox {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub async fn dispatch(&self, pending: Pending) {
        for notification in pending.notifications {
            match self.sink.deliver(&notification).await {
                Ok(()) => debug!("Delivered notification {} to user {}", notification.id, notification.user_id),
                Err(e) => warn!(
                    "Failed to deliver notification {} to user {}: {}",
                    notification.id, notification.user_id, e
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use souk_shared::NotificationCategory;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn deliver(
            &self,
            _notification: &Notification,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err("broker unavailable".into())
            } else {
                Ok(())
            }
        }
    }

    fn notification(id: i64) -> Notification {
        Notification {
            id,
            user_id: 7,
            message: "hello".to_string(),
            subject: None,
            category: NotificationCategory::Message,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_survives_sink_failure() {
        let sink = Arc::new(FlakySink { attempts: AtomicUsize::new(0) });
        let outbox = Outbox::new(sink.clone());
        let pending = Pending {
            notifications: vec![notification(1), notification(2)],
        };

        outbox.dispatch(pending).await;
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    }
}
