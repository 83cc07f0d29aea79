//! PostgreSQL store implementation.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use plinth_core::{
    Deployment, DeploymentId, DeploymentStatus, LogEvent, OwnerId, Project, ProjectId,
};

use crate::error::{ControlError, ControlResult};

use super::{ControlStore, StatusAdvance};

/// PostgreSQL-backed control store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(url: &str, max_connections: u32) -> ControlResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> ControlResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the required tables exist.
    async fn ensure_schema(&self) -> ControlResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                git_url TEXT NOT NULL,
                subdomain TEXT NOT NULL UNIQUE,
                custom_domain TEXT,
                owner_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id),
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS log_events (
                seq BIGSERIAL PRIMARY KEY,
                event_id UUID NOT NULL,
                deployment_id TEXT NOT NULL,
                log TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_project_created
            ON deployments (project_id, created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_log_events_deployment
            ON log_events (deployment_id, seq)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_project(row: &PgRow) -> Project {
        Project {
            id: ProjectId::new(row.get::<String, _>("id")),
            name: row.get("name"),
            git_url: row.get("git_url"),
            subdomain: row.get("subdomain"),
            custom_domain: row.get("custom_domain"),
            owner_id: OwnerId::new(row.get::<String, _>("owner_id")),
            created_at: row.get("created_at"),
        }
    }

    fn row_to_deployment(row: &PgRow) -> ControlResult<Deployment> {
        let status_str: String = row.get("status");
        let status: DeploymentStatus = status_str.parse().map_err(|e| {
            ControlError::Serialisation(format!("failed to parse status '{status_str}': {e}"))
        })?;

        Ok(Deployment {
            id: DeploymentId::new(row.get::<String, _>("id")),
            project_id: ProjectId::new(row.get::<String, _>("project_id")),
            status,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ControlStore for PostgresStore {
    async fn insert_project(&self, project: &Project) -> ControlResult<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, git_url, subdomain, custom_domain, owner_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(project.id.as_str())
        .bind(&project.name)
        .bind(&project.git_url)
        .bind(&project.subdomain)
        .bind(&project.custom_domain)
        .bind(project.owner_id.as_str())
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_project_owned(
        &self,
        id: &ProjectId,
        owner: &OwnerId,
    ) -> ControlResult<Option<Project>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, git_url, subdomain, custom_domain, owner_id, created_at
            FROM projects
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(id.as_str())
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_project))
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> ControlResult<()> {
        sqlx::query(
            r#"
            INSERT INTO deployments (id, project_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(deployment.id.as_str())
        .bind(deployment.project_id.as_str())
        .bind(deployment.status.as_str())
        .bind(deployment.created_at)
        .bind(deployment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ControlResult<Option<Deployment>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, status, created_at, updated_at
            FROM deployments
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_deployment(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_deployment_owned(
        &self,
        id: &DeploymentId,
        owner: &OwnerId,
    ) -> ControlResult<Option<Deployment>> {
        let row = sqlx::query(
            r#"
            SELECT d.id, d.project_id, d.status, d.created_at, d.updated_at
            FROM deployments d
            JOIN projects p ON p.id = d.project_id
            WHERE d.id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(id.as_str())
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_deployment(&r)?)),
            None => Ok(None),
        }
    }

    async fn list_deployments(&self, project_id: &ProjectId) -> ControlResult<Vec<Deployment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, status, created_at, updated_at
            FROM deployments
            WHERE project_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(project_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_deployment).collect()
    }

    async fn advance_status(
        &self,
        id: &DeploymentId,
        target: DeploymentStatus,
    ) -> ControlResult<StatusAdvance> {
        let predecessors: Vec<String> = DeploymentStatus::allowed_predecessors(target)
            .iter()
            .map(|s| s.as_str().to_owned())
            .collect();

        // The guard makes the update conditional on the current status,
        // so a replayed transition matches zero rows instead of
        // regressing a terminal deployment.
        let result = sqlx::query(
            r#"
            UPDATE deployments
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id.as_str())
        .bind(target.as_str())
        .bind(&predecessors)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(StatusAdvance::Applied)
        } else {
            Ok(StatusAdvance::NoOp)
        }
    }

    async fn append_log(&self, event: &LogEvent) -> ControlResult<()> {
        sqlx::query(
            r#"
            INSERT INTO log_events (event_id, deployment_id, log, timestamp)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.event_id)
        .bind(event.deployment_id.as_str())
        .bind(&event.log)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn logs_for_deployment(&self, id: &DeploymentId) -> ControlResult<Vec<LogEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, deployment_id, log, timestamp
            FROM log_events
            WHERE deployment_id = $1
            ORDER BY seq
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| LogEvent {
                event_id: row.get("event_id"),
                deployment_id: DeploymentId::new(row.get::<String, _>("deployment_id")),
                log: row.get("log"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }
}
