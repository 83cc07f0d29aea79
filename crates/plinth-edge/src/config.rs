//! Edge router configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::EdgeError;

/// Top-level edge router configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EdgeConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Artifact storage read path.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl EdgeConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources
    /// override earlier):
    /// 1. Default values
    /// 2. `edge.toml` in the current directory (if present)
    /// 3. Environment variables with `PLINTH_EDGE_` prefix
    pub fn load() -> Result<Self, EdgeError> {
        Figment::new()
            .merge(Toml::file("edge.toml"))
            .merge(Env::prefixed("PLINTH_EDGE_").split("__"))
            .extract()
            .map_err(|e| EdgeError::Config(e.to_string()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, EdgeError> {
        Figment::new()
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| EdgeError::Config(e.to_string()))
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address and port to bind the edge server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

const fn default_bind_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8001)
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

    /// Maximum number of pooled read connections.
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

/// Artifact storage read path.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Public base URL artifacts are readable at, including the bucket.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Upstream request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_public_base_url() -> String {
    "http://localhost:9000/plinth-artifacts".to_owned()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_public_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
