//! Core identifier and record types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::DeploymentStatus;

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a new project ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Create a new deployment ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique deployment ID using ULID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DeploymentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of the user that owns a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new owner ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered project.
///
/// Projects are created by the user-facing CRUD surface; the deployment
/// pipeline only ever reads them. `git_url` and `subdomain` are immutable
/// after creation, and `subdomain` is globally unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier.
    pub id: ProjectId,
    /// Human-readable project name.
    pub name: String,
    /// Git repository URL to build from.
    pub git_url: String,
    /// Subdomain the built site is served under.
    pub subdomain: String,
    /// Optional full custom hostname routed to this project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    /// Owning user.
    pub owner_id: OwnerId,
    /// When the project was created.
    pub created_at: DateTime<Utc>,
}

/// One build-and-publish attempt for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment identifier.
    pub id: DeploymentId,
    /// Project this deployment belongs to.
    pub project_id: ProjectId,
    /// Current lifecycle status.
    pub status: DeploymentStatus,
    /// When the deployment was created.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Create a new deployment in the queued state.
    #[must_use]
    pub fn new(project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            id: DeploymentId::generate(),
            project_id,
            status: DeploymentStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single persisted build-log line.
///
/// Log events are append-only; read-back order for one deployment matches
/// the order the lines were published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Unique event identifier, generated at write time.
    pub event_id: Uuid,
    /// Deployment the line belongs to.
    pub deployment_id: DeploymentId,
    /// Raw log text.
    pub log: String,
    /// When the line was persisted.
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    /// Create a new log event with a fresh ID and timestamp.
    #[must_use]
    pub fn new(deployment_id: DeploymentId, log: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            deployment_id,
            log: log.into(),
            timestamp: Utc::now(),
        }
    }
}
