use crate::BusError;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub brokers: String,
    pub topic: String,
    /// Flush cadence; batched records are sent at least this often.
    pub flush_interval: Duration,
    pub max_retries: u32,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "ws-gateway".to_string(),
            flush_interval: Duration::from_millis(500),
            max_retries: 5,
        }
    }
}

/// Publishes keyed payloads onto the bus. Acks are leader-only and
/// compression uses a fast block codec, matching this organization's other
/// Kafka producers.
pub struct BusProducer {
    producer: FutureProducer,
    topic: String,
}

impl BusProducer {
    pub fn new(config: &ProducerConfig) -> Result<Self, BusError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "1") // leader-only ack
            .set("compression.type", "snappy")
            .set(
                "queue.buffering.max.ms",
                config.flush_interval.as_millis().to_string(),
            )
            .set("message.send.max.retries", config.max_retries.to_string())
            .create()?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }

    /// Asynchronously enqueues `payload` keyed by `key`. This surfaces only
    /// enqueue-time failures (e.g. a full local queue); it does not wait for
    /// a broker acknowledgement, so the read loop calling it is never
    /// blocked on a durable ack.
    pub async fn publish_by_key(&self, key: &str, payload: &[u8]) -> Result<(), BusError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        match self.producer.send_result(record) {
            Ok(delivery) => {
                // Fire-and-forget: log delivery failures, never block on them.
                tokio::spawn(async move {
                    if let Ok(Err((err, _msg))) = delivery.await {
                        warn!("bus delivery failed after enqueue: {err}");
                    }
                });
                Ok(())
            }
            Err((err, _owned)) => {
                error!("bus publish failed at enqueue time: {err}");
                Err(BusError::Kafka(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_tuning() {
        let config = ProducerConfig::default();
        assert_eq!(config.flush_interval, Duration::from_millis(500));
        assert_eq!(config.max_retries, 5);
    }
}
