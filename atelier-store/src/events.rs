use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

/// Topic for hold placed/released events.
pub const TOPIC_RESERVATIONS: &str = "reservations.lifecycle";
/// Topic for confirmed checkouts.
pub const TOPIC_ORDERS: &str = "orders.confirmed";

/// Kafka producer for domain events. Consumers (analytics, the email
/// service) hang off these topics; publishing is best-effort and a delivery
/// failure never blocks the operation that produced the event.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok(delivery) => {
                debug!(
                    topic,
                    key,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Event published"
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, key, error = %e, "Failed to publish event");
                Err(e)
            }
        }
    }

    /// Serialize and publish, swallowing failures after logging them.
    pub async fn publish_json<T: Serialize>(&self, topic: &str, key: &str, event: &T) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                let _ = self.publish(topic, key, &payload).await;
            }
            Err(e) => error!(topic, key, error = %e, "Failed to serialize event"),
        }
    }
}
