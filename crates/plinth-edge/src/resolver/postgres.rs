//! PostgreSQL-backed site resolution.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use plinth_core::{DeploymentId, DeploymentStatus, ProjectId};

use crate::config::DatabaseConfig;
use crate::error::EdgeError;

use super::{RoutedSite, SiteResolver};

/// Resolver reading from the shared relational store.
#[derive(Debug, Clone)]
pub struct PostgresResolver {
    pool: PgPool,
}

impl PostgresResolver {
    /// Connect a pooled read path to the store.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, EdgeError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a resolver from an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn resolve_where(
        &self,
        project_predicate: &str,
        value: &str,
    ) -> Result<Option<RoutedSite>, EdgeError> {
        // One JOIN picks the newest READY deployment; projects without
        // one simply produce no row.
        let query = format!(
            r#"
            SELECT p.id AS project_id, d.id AS deployment_id
            FROM projects p
            JOIN deployments d ON d.project_id = p.id
            WHERE {project_predicate} AND d.status = $2
            ORDER BY d.created_at DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query(&query)
            .bind(value)
            .bind(DeploymentStatus::Ready.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| RoutedSite {
            project_id: ProjectId::new(r.get::<String, _>("project_id")),
            deployment_id: DeploymentId::new(r.get::<String, _>("deployment_id")),
        }))
    }
}

#[async_trait]
impl SiteResolver for PostgresResolver {
    async fn resolve_subdomain(&self, subdomain: &str) -> Result<Option<RoutedSite>, EdgeError> {
        self.resolve_where("p.subdomain = $1", subdomain).await
    }

    async fn resolve_custom_domain(&self, host: &str) -> Result<Option<RoutedSite>, EdgeError> {
        self.resolve_where("p.custom_domain = $1", host).await
    }
}
