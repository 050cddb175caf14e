//! Kafka-backed message bus: publish-by-key producer plus a worker-pool
//! consumer that hands received records to a registered dispatcher.

mod consumer;
mod producer;

pub use consumer::{BusConsumer, ConsumerConfig, Dispatcher};
pub use producer::{BusProducer, ProducerConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("kafka client error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}
