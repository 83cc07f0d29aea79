//! Deployment orchestration.
//!
//! Creating a deployment is a two-step sequence: persist a QUEUED row,
//! then ask the compute backend to launch exactly one build runner with
//! the deployment's environment descriptor. The second step can fail
//! after the first succeeded; the row is deliberately left behind in
//! QUEUED for an external reaper to reconcile, and the failure is
//! surfaced to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use plinth_core::{Deployment, DeploymentId, OwnerId, Project, ProjectId};

use crate::config::{ArtifactStorageConfig, BusConfig, DispatcherConfig, EdgeConfig};
use crate::dispatch::{ComputeDispatcher, EnvVar, TaskSpec};
use crate::error::{ControlError, ControlResult};
use crate::store::ControlStore;

/// Result of a successful deployment creation.
#[derive(Debug, Clone)]
pub struct CreatedDeployment {
    /// The new deployment's ID.
    pub deployment_id: DeploymentId,
    /// Public URL the site will be served at once READY.
    pub url: String,
}

/// Orchestrates deployment creation and build dispatch.
pub struct Orchestrator {
    store: Arc<dyn ControlStore>,
    dispatcher: Arc<dyn ComputeDispatcher>,
    dispatcher_config: DispatcherConfig,
    bus_config: BusConfig,
    artifact_config: ArtifactStorageConfig,
    edge_config: EdgeConfig,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(
        store: Arc<dyn ControlStore>,
        dispatcher: Arc<dyn ComputeDispatcher>,
        dispatcher_config: DispatcherConfig,
        bus_config: BusConfig,
        artifact_config: ArtifactStorageConfig,
        edge_config: EdgeConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            dispatcher_config,
            bus_config,
            artifact_config,
            edge_config,
        }
    }

    /// Create a deployment for a project and dispatch its build task.
    ///
    /// Fails with not-found when the project doesn't exist or isn't
    /// owned by the requester.
    pub async fn create_deployment(
        &self,
        project_id: &ProjectId,
        requester: &OwnerId,
    ) -> ControlResult<CreatedDeployment> {
        let project = self
            .store
            .get_project_owned(project_id, requester)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("Project not found: {project_id}")))?;

        let deployment = Deployment::new(project.id.clone());
        let deployment_id = deployment.id.clone();
        self.store.insert_deployment(&deployment).await?;

        info!(
            deployment_id = %deployment_id,
            project_id = %project.id,
            "deployment queued"
        );

        let spec = self.task_spec(&project, &deployment_id);
        let timeout = Duration::from_secs(self.dispatcher_config.dispatch_timeout_secs);

        let launch = tokio::time::timeout(timeout, self.dispatcher.launch(&spec)).await;
        match launch {
            Ok(Ok(handle)) => {
                info!(
                    deployment_id = %deployment_id,
                    task_id = %handle.id,
                    "build task dispatched"
                );
            }
            Ok(Err(e)) => {
                warn!(
                    deployment_id = %deployment_id,
                    error = %e,
                    "build dispatch failed; deployment row remains QUEUED"
                );
                return Err(e);
            }
            Err(_) => {
                warn!(
                    deployment_id = %deployment_id,
                    timeout_secs = self.dispatcher_config.dispatch_timeout_secs,
                    "build dispatch timed out; deployment row remains QUEUED"
                );
                return Err(ControlError::dispatch("dispatch timed out"));
            }
        }

        Ok(CreatedDeployment {
            deployment_id,
            url: self.edge_config.site_url(&project.subdomain),
        })
    }

    /// Build the environment descriptor for one runner task.
    fn task_spec(&self, project: &Project, deployment_id: &DeploymentId) -> TaskSpec {
        let env = vec![
            EnvVar::new("PLINTH_PROJECT_ID", project.id.as_str()),
            EnvVar::new("PLINTH_DEPLOYMENT_ID", deployment_id.as_str()),
            EnvVar::new("PLINTH_GIT_URL", &project.git_url),
            EnvVar::new("PLINTH_BUS__BROKERS", &self.bus_config.brokers),
            EnvVar::new("PLINTH_BUS__TOPIC", &self.bus_config.topic),
            EnvVar::new("PLINTH_STORAGE__ENDPOINT", &self.artifact_config.endpoint),
            EnvVar::new("PLINTH_STORAGE__BUCKET", &self.artifact_config.bucket),
            EnvVar::new("PLINTH_STORAGE__REGION", &self.artifact_config.region),
            EnvVar::new(
                "PLINTH_STORAGE__ACCESS_KEY_ID",
                &self.artifact_config.access_key_id,
            ),
            EnvVar::new(
                "PLINTH_STORAGE__SECRET_ACCESS_KEY",
                &self.artifact_config.secret_access_key,
            ),
        ];

        TaskSpec {
            image: self.dispatcher_config.image.clone(),
            command: vec![self
                .dispatcher_config
                .runner_binary
                .display()
                .to_string()],
            env,
        }
    }
}
