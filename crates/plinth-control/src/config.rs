//! Configuration for the control plane.
//!
//! Loaded once at process start; the resulting value is immutable and
//! passed explicitly to every component.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Top-level configuration for the control service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Message bus consumer configuration.
    #[serde(default)]
    pub bus: BusConfig,

    /// Caller authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Deployment-creation rate limiting.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    /// Compute dispatch configuration.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Artifact storage credentials forwarded to runners.
    #[serde(default)]
    pub artifacts: ArtifactStorageConfig,

    /// Public edge addressing used to build deployment URLs.
    #[serde(default)]
    pub edge: EdgeConfig,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources
    /// override earlier):
    /// 1. Default values
    /// 2. `control.toml` in the current directory (if present)
    /// 3. Environment variables with `PLINTH_CONTROL_` prefix
    pub fn load() -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file("control.toml"))
            .merge(Env::prefixed("PLINTH_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PLINTH_CONTROL_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address and port to bind the API server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

const fn default_bind_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgres://localhost/plinth".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Message bus consumer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Comma-separated Kafka broker addresses.
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Topic carrying build-log messages.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Consumer group identifier.
    #[serde(default = "default_group_id")]
    pub group_id: String,
}

fn default_brokers() -> String {
    "localhost:9092".to_owned()
}

fn default_topic() -> String {
    "build-logs".to_owned()
}

fn default_group_id() -> String {
    "plinth-control".to_owned()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            group_id: default_group_id(),
        }
    }
}

/// Caller authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret key for HMAC signature verification.
    #[serde(default = "default_auth_secret")]
    pub secret: String,

    /// HMAC algorithm to use for verification.
    #[serde(default)]
    pub algorithm: AuthAlgorithm,

    /// Expected token issuer (`iss` claim).
    #[serde(default)]
    pub issuer: Option<String>,

    /// Expected token audience (`aud` claim).
    #[serde(default)]
    pub audience: Option<String>,
}

fn default_auth_secret() -> String {
    "insecure-development-secret".to_owned()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
            algorithm: AuthAlgorithm::default(),
            issuer: None,
            audience: None,
        }
    }
}

/// JWT signing algorithm.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthAlgorithm {
    /// HMAC with SHA-256.
    #[default]
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
}

/// Per-caller rate limiting using a token bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum sustained request rate per second.
    pub requests_per_second: u32,
    /// Maximum burst size (bucket capacity).
    pub burst_size: u32,
}

/// Which compute backend launches build tasks.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherType {
    /// Spawn the runner binary as a local child process.
    #[default]
    Process,
    /// Record launches without running anything (tests, dry runs).
    Mock,
}

/// Compute dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Backend selection.
    #[serde(default)]
    pub dispatcher_type: DispatcherType,

    /// Container image for backends that launch images.
    #[serde(default = "default_runner_image")]
    pub image: String,

    /// Runner binary path for the process backend.
    #[serde(default = "default_runner_binary")]
    pub runner_binary: PathBuf,

    /// Upper bound on the dispatch call, in seconds.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

fn default_runner_image() -> String {
    "plinth/runner:latest".to_owned()
}

fn default_runner_binary() -> PathBuf {
    PathBuf::from("plinth-runner")
}

const fn default_dispatch_timeout_secs() -> u64 {
    30
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            dispatcher_type: DispatcherType::default(),
            image: default_runner_image(),
            runner_binary: default_runner_binary(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

/// Artifact storage credentials passed to runners at dispatch time.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactStorageConfig {
    /// Endpoint URL.
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,

    /// Bucket name.
    #[serde(default = "default_storage_bucket")]
    pub bucket: String,

    /// Region.
    #[serde(default = "default_storage_region")]
    pub region: String,

    /// Access key ID.
    #[serde(default)]
    pub access_key_id: String,

    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: String,
}

fn default_storage_endpoint() -> String {
    "http://localhost:9000".to_owned()
}

fn default_storage_bucket() -> String {
    "plinth-artifacts".to_owned()
}

fn default_storage_region() -> String {
    "auto".to_owned()
}

impl Default for ArtifactStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_storage_endpoint(),
            bucket: default_storage_bucket(),
            region: default_storage_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

/// Public edge addressing.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    /// URL scheme for deployment URLs.
    #[serde(default = "default_edge_scheme")]
    pub scheme: String,

    /// Domain (with optional port) subdomains hang off.
    #[serde(default = "default_edge_domain")]
    pub domain: String,
}

fn default_edge_scheme() -> String {
    "http".to_owned()
}

fn default_edge_domain() -> String {
    "localhost:8001".to_owned()
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            scheme: default_edge_scheme(),
            domain: default_edge_domain(),
        }
    }
}

impl EdgeConfig {
    /// Public URL a project's subdomain is served at.
    #[must_use]
    pub fn site_url(&self, subdomain: &str) -> String {
        format!("{}://{}.{}", self.scheme, subdomain, self.domain)
    }
}
