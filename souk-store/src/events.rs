use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use souk_core::notify::NotificationSink;
use souk_shared::Notification;
use std::time::Duration;
use tracing::{debug, error};

/// Thin wrapper over a `FutureProducer` for keyed JSON payloads.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()?;

        Ok(Self { producer })
    }

    /// Waits for the broker ack. A full local queue fails immediately.
    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        self.producer
            .send(record, Timeout::After(Duration::ZERO))
            .await
            .map(|delivery| {
                debug!(topic, key, partition = delivery.partition, offset = delivery.offset, "published");
            })
            .map_err(|(e, _)| {
                error!(topic, key, "Kafka publish failed: {}", e);
                e
            })
    }
}

/// Publishes committed notifications as JSON, keyed by recipient so one
/// user's messages stay ordered within a partition.
pub struct KafkaNotificationSink {
    producer: EventProducer,
    topic: String,
}

impl KafkaNotificationSink {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn deliver(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(notification)?;
        let key = notification.user_id.to_string();
        self.producer.publish(&self.topic, &key, &payload).await?;
        Ok(())
    }
}
