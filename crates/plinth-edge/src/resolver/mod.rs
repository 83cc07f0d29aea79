//! Host-to-site resolution.
//!
//! The edge router is stateless: every request resolves its Host header
//! against the relational store to find the owning project and its most
//! recently created READY deployment. A project with no READY deployment
//! resolves to nothing, which the caller surfaces as a plain 404.

mod memory;
mod postgres;

pub use memory::MemoryResolver;
pub use postgres::PostgresResolver;

use async_trait::async_trait;

use plinth_core::{DeploymentId, ProjectId};

use crate::error::EdgeError;

/// The routing target for one resolved host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedSite {
    /// Owning project.
    pub project_id: ProjectId,
    /// The READY deployment whose artifacts are served.
    pub deployment_id: DeploymentId,
}

/// Resolves hostnames to served deployments.
#[async_trait]
pub trait SiteResolver: Send + Sync + std::fmt::Debug {
    /// Resolve a subdomain to its project's latest READY deployment.
    async fn resolve_subdomain(&self, subdomain: &str) -> Result<Option<RoutedSite>, EdgeError>;

    /// Resolve a full hostname registered as a project's custom domain.
    async fn resolve_custom_domain(&self, host: &str) -> Result<Option<RoutedSite>, EdgeError>;
}
