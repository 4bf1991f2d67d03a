use async_trait::async_trait;
use citybite_core::notify::NotificationDispatcher;
use citybite_core::{CoreError, CoreResult};
use citybite_shared::NotificationEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

/// Publishes notification events to Kafka, keyed by order so one order's
/// events stay on one partition.
#[derive(Clone)]
pub struct KafkaDispatcher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaDispatcher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for KafkaDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> CoreResult<()> {
        let payload = serde_json::to_string(&event)?;
        let key = event.routing_key();
        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent {} to {}/{}: partition {} offset {}",
                    event.kind.as_str(),
                    self.topic,
                    key,
                    delivery.partition,
                    delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send {} to {}: {}", event.kind.as_str(), self.topic, e);
                Err(CoreError::InternalError(format!("kafka: {}", e)))
            }
        }
    }
}
