//! In-memory store for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use plinth_core::{
    Deployment, DeploymentId, DeploymentStatus, LogEvent, OwnerId, Project, ProjectId,
};

use crate::error::{ControlError, ControlResult};

use super::{ControlStore, StatusAdvance};

/// In-memory store for testing.
///
/// Not suitable for production use: data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<String, Project>>,
    deployments: RwLock<HashMap<String, Deployment>>,
    logs: RwLock<HashMap<String, Vec<LogEvent>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ControlStore for MemoryStore {
    async fn insert_project(&self, project: &Project) -> ControlResult<()> {
        let mut projects = self
            .projects
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let key = project.id.as_str().to_owned();
        if projects.contains_key(&key) {
            return Err(ControlError::internal(format!(
                "project {key} already exists"
            )));
        }
        if projects
            .values()
            .any(|p| p.subdomain == project.subdomain)
        {
            return Err(ControlError::internal(format!(
                "subdomain {} already taken",
                project.subdomain
            )));
        }

        projects.insert(key, project.clone());
        Ok(())
    }

    async fn get_project_owned(
        &self,
        id: &ProjectId,
        owner: &OwnerId,
    ) -> ControlResult<Option<Project>> {
        let projects = self
            .projects
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(projects
            .get(id.as_str())
            .filter(|p| &p.owner_id == owner)
            .cloned())
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> ControlResult<()> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let key = deployment.id.as_str().to_owned();
        if deployments.contains_key(&key) {
            return Err(ControlError::internal(format!(
                "deployment {key} already exists"
            )));
        }

        deployments.insert(key, deployment.clone());
        Ok(())
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ControlResult<Option<Deployment>> {
        let deployments = self
            .deployments
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(deployments.get(id.as_str()).cloned())
    }

    async fn get_deployment_owned(
        &self,
        id: &DeploymentId,
        owner: &OwnerId,
    ) -> ControlResult<Option<Deployment>> {
        let Some(deployment) = self.get_deployment(id).await? else {
            return Ok(None);
        };

        let projects = self
            .projects
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let owned = projects
            .get(deployment.project_id.as_str())
            .is_some_and(|p| &p.owner_id == owner);

        Ok(owned.then_some(deployment))
    }

    async fn list_deployments(&self, project_id: &ProjectId) -> ControlResult<Vec<Deployment>> {
        let deployments = self
            .deployments
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let mut results: Vec<_> = deployments
            .values()
            .filter(|d| &d.project_id == project_id)
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    async fn advance_status(
        &self,
        id: &DeploymentId,
        target: DeploymentStatus,
    ) -> ControlResult<StatusAdvance> {
        let mut deployments = self
            .deployments
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let Some(deployment) = deployments.get_mut(id.as_str()) else {
            return Ok(StatusAdvance::NoOp);
        };

        if !deployment.status.can_advance_to(target) {
            return Ok(StatusAdvance::NoOp);
        }

        deployment.status = target;
        deployment.updated_at = Utc::now();
        Ok(StatusAdvance::Applied)
    }

    async fn append_log(&self, event: &LogEvent) -> ControlResult<()> {
        let mut logs = self
            .logs
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        logs.entry(event.deployment_id.as_str().to_owned())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn logs_for_deployment(&self, id: &DeploymentId) -> ControlResult<Vec<LogEvent>> {
        let logs = self
            .logs
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(logs.get(id.as_str()).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_project(id: &str, subdomain: &str, owner: &str) -> Project {
        Project {
            id: ProjectId::new(id),
            name: format!("{id} site"),
            git_url: "https://github.com/user/site.git".to_owned(),
            subdomain: subdomain.to_owned(),
            custom_domain: None,
            owner_id: OwnerId::new(owner),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ownership_gates_project_lookup() {
        let store = MemoryStore::new();
        store
            .insert_project(&test_project("proj-1", "blog", "alice"))
            .await
            .unwrap();

        let owned = store
            .get_project_owned(&ProjectId::new("proj-1"), &OwnerId::new("alice"))
            .await
            .unwrap();
        assert!(owned.is_some());

        let foreign = store
            .get_project_owned(&ProjectId::new("proj-1"), &OwnerId::new("mallory"))
            .await
            .unwrap();
        assert!(foreign.is_none());
    }

    #[tokio::test]
    async fn duplicate_subdomain_is_rejected() {
        let store = MemoryStore::new();
        store
            .insert_project(&test_project("proj-1", "blog", "alice"))
            .await
            .unwrap();

        let result = store
            .insert_project(&test_project("proj-2", "blog", "bob"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn advance_status_is_idempotent() {
        let store = MemoryStore::new();
        let deployment = Deployment::new(ProjectId::new("proj-1"));
        let id = deployment.id.clone();
        store.insert_deployment(&deployment).await.unwrap();

        assert_eq!(
            store
                .advance_status(&id, DeploymentStatus::InProgress)
                .await
                .unwrap(),
            StatusAdvance::Applied
        );
        assert_eq!(
            store
                .advance_status(&id, DeploymentStatus::InProgress)
                .await
                .unwrap(),
            StatusAdvance::NoOp
        );
        assert_eq!(
            store
                .advance_status(&id, DeploymentStatus::Ready)
                .await
                .unwrap(),
            StatusAdvance::Applied
        );
        // Terminal states absorb every later attempt.
        assert_eq!(
            store
                .advance_status(&id, DeploymentStatus::Fail)
                .await
                .unwrap(),
            StatusAdvance::NoOp
        );

        let stored = store.get_deployment(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeploymentStatus::Ready);
    }

    #[tokio::test]
    async fn advance_status_on_unknown_deployment_is_noop() {
        let store = MemoryStore::new();
        let result = store
            .advance_status(&DeploymentId::new("ghost"), DeploymentStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(result, StatusAdvance::NoOp);
    }

    #[tokio::test]
    async fn list_deployments_newest_first() {
        let store = MemoryStore::new();
        let project_id = ProjectId::new("proj-1");

        let mut older = Deployment::new(project_id.clone());
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        let newer = Deployment::new(project_id.clone());

        store.insert_deployment(&older).await.unwrap();
        store.insert_deployment(&newer).await.unwrap();

        let listed = store.list_deployments(&project_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);
    }

    #[tokio::test]
    async fn logs_preserve_append_order() {
        let store = MemoryStore::new();
        let id = DeploymentId::new("dep-1");

        for i in 0..5 {
            store
                .append_log(&LogEvent::new(id.clone(), format!("line {i}")))
                .await
                .unwrap();
        }

        let logs = store.logs_for_deployment(&id).await.unwrap();
        let lines: Vec<_> = logs.iter().map(|l| l.log.as_str()).collect();
        assert_eq!(lines, vec!["line 0", "line 1", "line 2", "line 3", "line 4"]);
    }

    #[tokio::test]
    async fn deployment_ownership_follows_project() {
        let store = MemoryStore::new();
        store
            .insert_project(&test_project("proj-1", "blog", "alice"))
            .await
            .unwrap();

        let deployment = Deployment::new(ProjectId::new("proj-1"));
        let id = deployment.id.clone();
        store.insert_deployment(&deployment).await.unwrap();

        assert!(store
            .get_deployment_owned(&id, &OwnerId::new("alice"))
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_deployment_owned(&id, &OwnerId::new("mallory"))
            .await
            .unwrap()
            .is_none());
    }
}
