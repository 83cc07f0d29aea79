//! Local process dispatch backend.
//!
//! Spawns the runner binary directly on the control-plane host. This is
//! the development and self-hosted backend; the task's lifetime is not
//! tracked beyond the launch acknowledgment, matching the fire-and-forget
//! dispatch contract.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::DispatcherConfig;
use crate::error::{ControlError, ControlResult};

use super::{ComputeDispatcher, TaskHandle, TaskSpec};

/// Dispatcher that launches runners as local child processes.
pub struct ProcessDispatcher {
    runner_binary: PathBuf,
}

impl ProcessDispatcher {
    /// Create a process dispatcher from configuration.
    #[must_use]
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            runner_binary: config.runner_binary.clone(),
        }
    }
}

#[async_trait]
impl ComputeDispatcher for ProcessDispatcher {
    async fn launch(&self, spec: &TaskSpec) -> ControlResult<TaskHandle> {
        // The image field only applies to container backends.
        debug!(image = %spec.image, "process backend ignores the task image");

        let mut cmd = Command::new(&self.runner_binary);
        for var in &spec.env {
            cmd.env(&var.name, &var.value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            ControlError::dispatch(format!(
                "failed to spawn {}: {e}",
                self.runner_binary.display()
            ))
        })?;

        let id = child
            .id()
            .map_or_else(|| "unknown".to_owned(), |pid| pid.to_string());

        info!(pid = %id, "build runner launched");

        Ok(TaskHandle { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::EnvVar;

    #[tokio::test]
    async fn missing_binary_is_a_dispatch_error() {
        let config = DispatcherConfig {
            runner_binary: PathBuf::from("/nonexistent/plinth-runner"),
            ..Default::default()
        };
        let dispatcher = ProcessDispatcher::new(&config);

        let spec = TaskSpec {
            image: "plinth/runner:latest".to_owned(),
            command: vec![],
            env: vec![EnvVar::new("PLINTH_PROJECT_ID", "proj-1")],
        };

        let result = dispatcher.launch(&spec).await;
        assert!(matches!(result, Err(ControlError::Dispatch(_))));
    }

    #[tokio::test]
    async fn launch_reports_a_task_handle() {
        // `true` exits immediately; the dispatcher only promises launch
        // acknowledgment, not completion tracking.
        let config = DispatcherConfig {
            runner_binary: PathBuf::from("true"),
            ..Default::default()
        };
        let dispatcher = ProcessDispatcher::new(&config);

        let spec = TaskSpec {
            image: "plinth/runner:latest".to_owned(),
            command: vec![],
            env: vec![],
        };

        let handle = dispatcher.launch(&spec).await.unwrap();
        assert!(!handle.id.is_empty());
    }
}
