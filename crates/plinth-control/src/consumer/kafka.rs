//! Kafka consumer loop for the log pipeline.
//!
//! Joins a consumer group on the build-log topic. The topic is
//! partitioned by deployment id, so all messages for one deployment
//! arrive in publish order within a partition. Auto-commit is disabled:
//! an offset is committed only after the message's side effects have
//! been applied, giving at-least-once delivery. Group heartbeats are
//! sent from librdkafka's background thread, so long message processing
//! does not expire the group membership.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::BusConfig;
use crate::error::{ControlError, ControlResult};

use super::LogPipeline;

/// Run the consumer loop until cancellation.
pub async fn run_consumer(
    config: &BusConfig,
    pipeline: LogPipeline,
    cancel: CancellationToken,
) -> ControlResult<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()
        .map_err(|e| ControlError::Config(format!("failed to create consumer: {e}")))?;

    consumer
        .subscribe(&[config.topic.as_str()])
        .map_err(|e| ControlError::Config(format!("failed to subscribe: {e}")))?;

    info!(
        brokers = %config.brokers,
        topic = %config.topic,
        group_id = %config.group_id,
        "log consumer started"
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("log consumer shutting down");
                break;
            }
            result = consumer.recv() => {
                match result {
                    Ok(message) => {
                        let payload = message.payload().unwrap_or_default();

                        match pipeline.process(payload).await {
                            Ok(()) => {
                                if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                    warn!(error = %e, "failed to commit offset");
                                }
                            }
                            Err(e) => {
                                // Leave the offset uncommitted; the message
                                // is redelivered and the idempotent store
                                // makes the replay harmless.
                                error!(
                                    error = %e,
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    "failed to process build message"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "bus receive error");
                    }
                }
            }
        }
    }

    Ok(())
}
