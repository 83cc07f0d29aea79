//! Log pipeline: build-log messages drive the deployment state machine.
//!
//! Message handling is split from bus plumbing so the pipeline itself is
//! testable without a broker. Per message, in order:
//!
//! 1. Parse the JSON payload; malformed payloads are logged and dropped,
//!    never retried and never fatal.
//! 2. If the line is a sentinel, conditionally advance the deployment's
//!    status. The store applies the transition only from an allowed
//!    predecessor state, so redelivered sentinels are silent no-ops.
//! 3. Unconditionally append a log event with a fresh ID and timestamp.
//!    Duplicate rows from redelivery are an accepted cost of
//!    at-least-once delivery, not deduplicated.
//!
//! A storage error propagates so the caller leaves the offset
//! uncommitted and the message is redelivered.

mod kafka;

pub use kafka::run_consumer;

use std::sync::Arc;

use tracing::{debug, info, warn};

use plinth_core::{BuildMessage, LogEvent, Sentinel};

use crate::error::ControlResult;
use crate::store::{ControlStore, StatusAdvance};

/// Processes build-log messages from the bus.
pub struct LogPipeline {
    store: Arc<dyn ControlStore>,
}

impl LogPipeline {
    /// Create a new pipeline over the given store.
    pub fn new(store: Arc<dyn ControlStore>) -> Self {
        Self { store }
    }

    /// Handle one raw bus payload.
    pub async fn process(&self, payload: &[u8]) -> ControlResult<()> {
        let message = match BuildMessage::from_bytes(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed build message");
                return Ok(());
            }
        };

        if let Some(sentinel) = Sentinel::detect(&message.log) {
            let target = sentinel.target_status();
            match self
                .store
                .advance_status(&message.deployment_id, target)
                .await?
            {
                StatusAdvance::Applied => {
                    info!(
                        deployment_id = %message.deployment_id,
                        status = %target,
                        "deployment status advanced"
                    );
                }
                StatusAdvance::NoOp => {
                    debug!(
                        deployment_id = %message.deployment_id,
                        status = %target,
                        "status transition already applied"
                    );
                }
            }
        }

        let event = LogEvent::new(message.deployment_id.clone(), message.log);
        self.store.append_log(&event).await?;

        Ok(())
    }
}
