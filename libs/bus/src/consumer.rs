use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::BusError;

/// Callback invoked for every consumed record, keyed by the recipient user
/// id. Registered once at startup; this is the Outbound Dispatcher wiring
/// point.
pub type Dispatcher = Arc<dyn Fn(String, Vec<u8>) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: String,
    pub topics: Vec<String>,
    /// Base consumer group id; the running pod's name (if set) is appended.
    pub group_id: String,
    pub pod_name: Option<String>,
    /// Worker pool size draining the internal buffered channel.
    pub concurrency: usize,
    /// Internal buffered channel capacity between the poll loop and workers.
    pub channel_capacity: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topics: vec!["ws-gateway".to_string()],
            group_id: "ws-gateway".to_string(),
            pod_name: std::env::var("POD_NAME").ok(),
            concurrency: 1,
            channel_capacity: 1024,
        }
    }
}

impl ConsumerConfig {
    fn effective_group_id(&self) -> String {
        match &self.pod_name {
            Some(pod) if !pod.is_empty() => format!("{}_{}", self.group_id, pod),
            _ => self.group_id.clone(),
        }
    }
}

struct Record {
    key: String,
    payload: Vec<u8>,
}

/// Consumer-group side of the bus: a bounded worker pool fed by a single
/// poll loop. Error events (timeouts, rebalance hiccups) are logged and do
/// not terminate the pool; only an explicit `shutdown()` does, and shutdown
/// is safe to call more than once.
pub struct BusConsumer {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl BusConsumer {
    pub fn start(config: ConsumerConfig, dispatcher: Dispatcher) -> Result<Self, BusError> {
        let consumer: Arc<StreamConsumer> = Arc::new(
            ClientConfig::new()
                .set("bootstrap.servers", &config.brokers)
                .set("group.id", config.effective_group_id())
                .set("enable.auto.commit", "false")
                .set("session.timeout.ms", "10000")
                .set("heartbeat.interval.ms", "3000")
                .set("partition.assignment.strategy", "roundrobin")
                .set("auto.offset.reset", "earliest")
                .create()?,
        );

        let topic_refs: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<Record>(config.channel_capacity);

        let poll_handle = {
            let consumer = consumer.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { poll_loop(consumer, tx, shutdown).await })
        };

        let mut handles = vec![poll_handle];
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker_id in 0..config.concurrency.max(1) {
            let rx = rx.clone();
            let consumer = consumer.clone();
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, consumer, dispatcher, shutdown).await
            }));
        }

        Ok(Self { shutdown, handles })
    }

    /// Idempotent: calling this more than once is a no-op after the first.
    pub async fn shutdown(self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in self.handles {
            handle.abort();
        }
    }
}

async fn poll_loop(
    consumer: Arc<StreamConsumer>,
    tx: mpsc::Sender<Record>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("bus consumer poll loop observed shutdown");
            break;
        }

        match consumer.recv().await {
            Ok(message) => {
                let key = message
                    .key()
                    .map(|k| String::from_utf8_lossy(k).to_string())
                    .unwrap_or_default();
                let payload = message.payload().unwrap_or_default().to_vec();

                if tx.send(Record { key, payload }).await.is_err() {
                    warn!("bus consumer worker channel closed, stopping poll loop");
                    break;
                }

                if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                    warn!("bus consumer commit failed: {err}");
                }
            }
            Err(err) => {
                // Timeouts and transient broker errors are logged, never fatal.
                warn!("bus consumer recv error: {err}");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Record>>>,
    _consumer: Arc<StreamConsumer>,
    dispatcher: Dispatcher,
    shutdown: Arc<AtomicBool>,
) {
    info!(worker_id, "bus consumer worker started");
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let record = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        match record {
            Some(record) => {
                if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    dispatcher(record.key, record.payload)
                })) {
                    error!(worker_id, ?panic, "bus dispatcher panicked");
                }
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_group_id_has_no_pod_suffix_when_unset() {
        let mut config = ConsumerConfig::default();
        config.pod_name = None;
        assert_eq!(config.effective_group_id(), "ws-gateway");
    }

    #[test]
    fn group_id_gets_pod_suffix_when_set() {
        let mut config = ConsumerConfig::default();
        config.pod_name = Some("pod-7".to_string());
        assert_eq!(config.effective_group_id(), "ws-gateway_pod-7");
    }

    #[test]
    fn default_concurrency_and_channel_capacity_match_documented_defaults() {
        let config = ConsumerConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.channel_capacity, 1024);
    }
}
