//! Runner configuration.
//!
//! A runner receives its entire configuration through environment
//! variables set by the compute dispatcher. The configuration is read
//! once at process start into an immutable value; nothing in the
//! pipeline consults the ambient environment afterwards.

use std::path::PathBuf;

use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;

use plinth_core::{DeploymentId, ProjectId};

use crate::error::RunnerError;

/// Environment variable prefix for all runner settings.
///
/// Nested fields use `__` as the separator, e.g. `PLINTH_BUS__BROKERS`.
pub const ENV_PREFIX: &str = "PLINTH_";

/// Complete configuration for one build run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Project being built.
    pub project_id: ProjectId,

    /// Deployment this run belongs to.
    pub deployment_id: DeploymentId,

    /// Git repository URL to clone.
    pub git_url: String,

    /// Directory the repository is cloned into.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Build output directory, relative to the workspace.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Dependency installation command, run first.
    #[serde(default = "default_install_command")]
    pub install_command: String,

    /// Build command, run only after the install command succeeds.
    #[serde(default = "default_build_command")]
    pub build_command: String,

    /// Message bus settings.
    pub bus: BusConfig,

    /// Artifact storage settings.
    pub storage: StorageConfig,
}

/// Message bus producer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Comma-separated Kafka broker addresses.
    pub brokers: String,

    /// Topic build-log messages are published to.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Client identifier reported to the brokers.
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

/// S3-compatible artifact storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Endpoint URL (e.g. `https://s3.example.com`).
    pub endpoint: String,

    /// Bucket name.
    pub bucket: String,

    /// Region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Access key ID.
    pub access_key_id: String,

    /// Secret access key.
    pub secret_access_key: String,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("/tmp/plinth/workspace")
}

fn default_output_dir() -> String {
    "dist".to_owned()
}

fn default_install_command() -> String {
    "npm install".to_owned()
}

fn default_build_command() -> String {
    "npm run build".to_owned()
}

fn default_topic() -> String {
    "build-logs".to_owned()
}

fn default_client_id() -> String {
    "plinth-runner".to_owned()
}

fn default_region() -> String {
    "auto".to_owned()
}

impl RunnerConfig {
    /// Load configuration from `PLINTH_`-prefixed environment variables.
    pub fn from_env() -> Result<Self, RunnerError> {
        Figment::new()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| RunnerError::Config(e.to_string()))
    }

    /// Absolute path of the build output directory.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.workspace_dir.join(&self.output_dir)
    }
}
