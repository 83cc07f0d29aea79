//! Persistence for projects, deployments and build logs.
//!
//! The primary implementation uses PostgreSQL; an in-memory
//! implementation is provided for testing. Both enforce the deployment
//! status transition rules at the storage layer, so replayed or
//! out-of-order transition attempts are no-ops rather than errors.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use plinth_core::{
    Deployment, DeploymentId, DeploymentStatus, LogEvent, OwnerId, Project, ProjectId,
};

use crate::error::ControlResult;

/// Outcome of a conditional status advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAdvance {
    /// The transition was applied.
    Applied,
    /// The deployment was already at or past the target status (or does
    /// not exist); nothing changed.
    NoOp,
}

/// Backend for the control plane's relational state.
#[async_trait]
pub trait ControlStore: Send + Sync {
    /// Insert a project row.
    ///
    /// Projects are created by the user-facing CRUD surface; the
    /// deployment pipeline itself only reads them. This method exists
    /// for that collaborator and for test seeding.
    async fn insert_project(&self, project: &Project) -> ControlResult<()>;

    /// Get a project by ID, only if it is owned by `owner`.
    ///
    /// Returns `None` both when the project does not exist and when it
    /// belongs to someone else; callers must not be able to distinguish
    /// the two.
    async fn get_project_owned(
        &self,
        id: &ProjectId,
        owner: &OwnerId,
    ) -> ControlResult<Option<Project>>;

    /// Insert a new deployment row.
    async fn insert_deployment(&self, deployment: &Deployment) -> ControlResult<()>;

    /// Get a deployment by ID.
    async fn get_deployment(&self, id: &DeploymentId) -> ControlResult<Option<Deployment>>;

    /// Get a deployment by ID, only if its project is owned by `owner`.
    async fn get_deployment_owned(
        &self,
        id: &DeploymentId,
        owner: &OwnerId,
    ) -> ControlResult<Option<Deployment>>;

    /// List all deployments for a project, newest first.
    async fn list_deployments(&self, project_id: &ProjectId) -> ControlResult<Vec<Deployment>>;

    /// Conditionally advance a deployment's status.
    ///
    /// The update applies only when the current status is an allowed
    /// predecessor of `target`; otherwise it is a no-op. This is what
    /// makes redelivered sentinels harmless.
    async fn advance_status(
        &self,
        id: &DeploymentId,
        target: DeploymentStatus,
    ) -> ControlResult<StatusAdvance>;

    /// Append a log event. Log events are never updated or deleted.
    async fn append_log(&self, event: &LogEvent) -> ControlResult<()>;

    /// All log events for a deployment, in insertion order.
    async fn logs_for_deployment(&self, id: &DeploymentId) -> ControlResult<Vec<LogEvent>>;
}
