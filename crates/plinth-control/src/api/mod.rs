//! HTTP API for the control plane.
//!
//! Provides endpoints for:
//! - Triggering deployments (`POST /deploy`)
//! - Querying deployments and their logs
//! - Health checks
//!
//! All routes except `/health` require a valid bearer token; reads
//! enforce project ownership against the authenticated caller.

mod deployments;
mod response;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};

pub use deployments::{CreateDeploymentRequest, DeployResponse, DeploymentDto};
pub use response::ApiResponse;

use crate::config::{AuthConfig, RateLimitConfig};
use crate::error::ControlResult;
use crate::middleware::{apply_rate_limit, AuthLayer};
use crate::orchestrator::Orchestrator;
use crate::store::ControlStore;

/// Shared application state for the control API.
#[derive(Clone)]
pub struct AppState {
    /// Deployment orchestrator.
    pub orchestrator: Arc<Orchestrator>,
    /// Store for direct queries.
    pub store: Arc<dyn ControlStore>,
}

/// Creates the API router.
///
/// The rate limit layer wraps only the deploy route; queries are not
/// deployment-creation traffic.
pub fn router(
    state: AppState,
    auth: &AuthConfig,
    rate_limit: Option<&RateLimitConfig>,
) -> ControlResult<Router> {
    let mut deploy_routes = Router::new().route("/deploy", post(deployments::create_deployment));
    if let Some(config) = rate_limit {
        deploy_routes = apply_rate_limit(deploy_routes, config)?;
    }

    let protected = Router::new()
        .route("/deployments/{id}", get(deployments::get_deployment))
        .route(
            "/deployments/{id}/logs",
            get(deployments::get_deployment_logs),
        )
        .route(
            "/projects/{id}/deployments",
            get(deployments::list_project_deployments),
        )
        .merge(deploy_routes)
        .layer(AuthLayer::new(auth));

    Ok(Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .with_state(state))
}

/// Health check endpoint.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
