//! Build-log message payload carried by the message bus.

use serde::{Deserialize, Serialize};

use crate::types::{DeploymentId, ProjectId};

/// One build-log line published by a runner.
///
/// Messages for the same deployment share a partition key and are
/// therefore delivered in publish order; messages for different
/// deployments carry no ordering relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMessage {
    /// Project the build belongs to.
    pub project_id: ProjectId,
    /// Deployment the build belongs to.
    pub deployment_id: DeploymentId,
    /// Raw log line.
    pub log: String,
}

impl BuildMessage {
    /// Create a new build message.
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        deployment_id: DeploymentId,
        log: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            deployment_id,
            log: log.into(),
        }
    }

    /// The bus partition key: all messages for one deployment share it.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        self.deployment_id.as_str()
    }

    /// Serialise to the JSON wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse from the JSON wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
