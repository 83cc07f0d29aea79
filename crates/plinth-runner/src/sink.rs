//! Build-log publishing.
//!
//! The bus is the runner's only channel back to the control plane.
//! Publishes are fire-and-forget from the pipeline's perspective; the
//! partition key (the deployment id) is what guarantees per-deployment
//! ordering on the wire.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::{info, warn};

use plinth_core::BuildMessage;

use crate::config::BusConfig;
use crate::error::RunnerError;

/// Destination for build-log lines.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Publish one message. Failures are logged, never propagated.
    async fn publish(&self, message: BuildMessage);

    /// Block until buffered messages have been handed to the bus.
    fn flush(&self) {}
}

/// Kafka-backed log sink.
#[derive(Clone)]
pub struct KafkaLogSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaLogSink {
    /// Create a producer from bus configuration.
    pub fn new(config: &BusConfig) -> Result<Self, RunnerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| RunnerError::Config(format!("failed to create producer: {e}")))?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            "bus producer created"
        );

        Ok(Self {
            producer,
            topic: config.topic.clone(),
        })
    }
}

#[async_trait]
impl LogSink for KafkaLogSink {
    async fn publish(&self, message: BuildMessage) {
        let payload = match message.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to serialise build message");
                return;
            }
        };

        let record = FutureRecord::to(&self.topic)
            .key(message.partition_key())
            .payload(&payload);

        // Enqueue without awaiting delivery; the producer preserves
        // per-partition order and flush() drains the queue on exit.
        if let Err((e, _)) = self.producer.send_result(record) {
            warn!(error = %e, "failed to enqueue build message");
        }
    }

    fn flush(&self) {
        if let Err(e) = self.producer.flush(Duration::from_secs(10)) {
            warn!(error = %e, "failed to flush bus producer");
        }
    }
}

/// In-memory log sink that records published messages.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<BuildMessage>>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages published so far, in publish order.
    #[must_use]
    pub fn messages(&self) -> Vec<BuildMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// The log text of every published message, in publish order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|message| message.log)
            .collect()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn publish(&self, message: BuildMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}
