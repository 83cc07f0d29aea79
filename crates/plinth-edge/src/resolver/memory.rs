//! In-memory site resolution for testing.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use plinth_core::{DeploymentId, DeploymentStatus, ProjectId};

use crate::error::EdgeError;

use super::{RoutedSite, SiteResolver};

#[derive(Debug, Clone)]
struct SiteEntry {
    project_id: ProjectId,
    subdomain: String,
    custom_domain: Option<String>,
}

#[derive(Debug, Clone)]
struct DeploymentEntry {
    id: DeploymentId,
    project_id: ProjectId,
    status: DeploymentStatus,
    created_at: DateTime<Utc>,
}

/// In-memory resolver for testing.
///
/// Applies the same selection rule as the SQL implementation: the most
/// recently created READY deployment wins.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    sites: RwLock<Vec<SiteEntry>>,
    deployments: RwLock<Vec<DeploymentEntry>>,
}

impl MemoryResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project.
    pub fn add_project(
        &self,
        project_id: ProjectId,
        subdomain: impl Into<String>,
        custom_domain: Option<String>,
    ) {
        if let Ok(mut sites) = self.sites.write() {
            sites.push(SiteEntry {
                project_id,
                subdomain: subdomain.into(),
                custom_domain,
            });
        }
    }

    /// Register a deployment.
    pub fn add_deployment(
        &self,
        deployment_id: DeploymentId,
        project_id: ProjectId,
        status: DeploymentStatus,
        created_at: DateTime<Utc>,
    ) {
        if let Ok(mut deployments) = self.deployments.write() {
            deployments.push(DeploymentEntry {
                id: deployment_id,
                project_id,
                status,
                created_at,
            });
        }
    }

    fn latest_ready(&self, project_id: &ProjectId) -> Option<RoutedSite> {
        let deployments = self.deployments.read().ok()?;

        deployments
            .iter()
            .filter(|d| &d.project_id == project_id && d.status == DeploymentStatus::Ready)
            .max_by_key(|d| d.created_at)
            .map(|d| RoutedSite {
                project_id: project_id.clone(),
                deployment_id: d.id.clone(),
            })
    }
}

#[async_trait]
impl SiteResolver for MemoryResolver {
    async fn resolve_subdomain(&self, subdomain: &str) -> Result<Option<RoutedSite>, EdgeError> {
        let project_id = {
            let sites = self
                .sites
                .read()
                .map_err(|_| EdgeError::Config("lock poisoned".to_owned()))?;
            sites
                .iter()
                .find(|s| s.subdomain == subdomain)
                .map(|s| s.project_id.clone())
        };

        Ok(project_id.and_then(|id| self.latest_ready(&id)))
    }

    async fn resolve_custom_domain(&self, host: &str) -> Result<Option<RoutedSite>, EdgeError> {
        let project_id = {
            let sites = self
                .sites
                .read()
                .map_err(|_| EdgeError::Config("lock poisoned".to_owned()))?;
            sites
                .iter()
                .find(|s| s.custom_domain.as_deref() == Some(host))
                .map(|s| s.project_id.clone())
        };

        Ok(project_id.and_then(|id| self.latest_ready(&id)))
    }
}
