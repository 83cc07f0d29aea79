//! Compute dispatch for ephemeral build tasks.
//!
//! Every provider-specific "run a container/task" API collapses into one
//! capability: hand over an environment descriptor, get back a task
//! handle or an error. Swapping the backend must never touch the
//! deployment state machine or the log consumer.

mod process;

pub use process::ProcessDispatcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{DispatcherConfig, DispatcherType};
use crate::error::{ControlError, ControlResult};

/// One environment variable passed to a build task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

impl EnvVar {
    /// Create an environment variable.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Description of one build task to launch.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Container image for image-based backends.
    pub image: String,
    /// Command to run inside the task.
    pub command: Vec<String>,
    /// Environment descriptor for the runner.
    pub env: Vec<EnvVar>,
}

impl TaskSpec {
    /// Look up an environment variable by name.
    #[must_use]
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|var| var.name == name)
            .map(|var| var.value.as_str())
    }
}

/// Handle to a launched task.
///
/// Launch acknowledgment is all a backend promises; there is no
/// synchronous build-completion signal. Everything after launch flows
/// back through the message bus.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    /// Backend-specific task identifier.
    pub id: String,
}

/// Capability for launching ephemeral build tasks.
#[async_trait]
pub trait ComputeDispatcher: Send + Sync {
    /// Launch exactly one build task.
    async fn launch(&self, spec: &TaskSpec) -> ControlResult<TaskHandle>;
}

/// Create a dispatcher from configuration.
pub fn create_dispatcher(config: &DispatcherConfig) -> ControlResult<Arc<dyn ComputeDispatcher>> {
    match config.dispatcher_type {
        DispatcherType::Process => Ok(Arc::new(ProcessDispatcher::new(config))),
        DispatcherType::Mock => Ok(Arc::new(MockDispatcher::default())),
    }
}

/// Mock dispatcher that records launches.
#[derive(Debug, Default)]
pub struct MockDispatcher {
    launches: Mutex<Vec<TaskSpec>>,
    fail: AtomicBool,
}

impl MockDispatcher {
    /// Create a dispatcher that acknowledges every launch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher that fails every launch.
    #[must_use]
    pub fn failing() -> Self {
        let dispatcher = Self::default();
        dispatcher.fail.store(true, Ordering::SeqCst);
        dispatcher
    }

    /// All launch specs received so far.
    #[must_use]
    pub fn launches(&self) -> Vec<TaskSpec> {
        self.launches.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ComputeDispatcher for MockDispatcher {
    async fn launch(&self, spec: &TaskSpec) -> ControlResult<TaskHandle> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControlError::dispatch("mock dispatcher set to fail"));
        }

        let mut launches = self
            .launches
            .lock()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        launches.push(spec.clone());

        Ok(TaskHandle {
            id: format!("mock-task-{}", launches.len()),
        })
    }
}
