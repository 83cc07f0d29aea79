//! Deployment endpoints.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use plinth_core::{Deployment, DeploymentId, LogEvent, ProjectId};

use crate::error::{ControlError, ControlResult};
use crate::middleware::Caller;

use super::response::ApiResponse;
use super::AppState;

/// Request to create a new deployment.
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    /// Project to deploy.
    #[serde(default)]
    pub project_id: String,
}

/// Response for a created deployment.
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    /// The new deployment's ID.
    pub deployment_id: String,
    /// Initial status.
    pub status: String,
    /// Public URL the site will be served at once ready.
    pub url: String,
}

/// A deployment as returned by query endpoints.
#[derive(Debug, Serialize)]
pub struct DeploymentDto {
    /// Deployment ID.
    pub id: String,
    /// Owning project ID.
    pub project_id: String,
    /// Current status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last status change timestamp.
    pub updated_at: String,
}

impl From<Deployment> for DeploymentDto {
    fn from(deployment: Deployment) -> Self {
        Self {
            id: deployment.id.to_string(),
            project_id: deployment.project_id.to_string(),
            status: deployment.status.as_str().to_owned(),
            created_at: deployment.created_at.to_rfc3339(),
            updated_at: deployment.updated_at.to_rfc3339(),
        }
    }
}

/// One log line as returned by the logs endpoint.
#[derive(Debug, Serialize)]
pub struct LogLineDto {
    /// Event ID.
    pub event_id: String,
    /// Raw log text.
    pub log: String,
    /// Persistence timestamp.
    pub timestamp: String,
}

impl From<LogEvent> for LogLineDto {
    fn from(event: LogEvent) -> Self {
        Self {
            event_id: event.event_id.to_string(),
            log: event.log,
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

/// Response for the logs endpoint.
#[derive(Debug, Serialize)]
pub struct DeploymentLogsResponse {
    /// Deployment summary.
    pub deployment: DeploymentSummary,
    /// Log lines in publish order.
    pub logs: Vec<LogLineDto>,
}

/// Minimal deployment summary embedded in the logs response.
#[derive(Debug, Serialize)]
pub struct DeploymentSummary {
    /// Deployment ID.
    pub id: String,
    /// Current status.
    pub status: String,
}

/// `POST /deploy` — create a deployment and dispatch its build.
pub async fn create_deployment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateDeploymentRequest>,
) -> ControlResult<ApiResponse<DeployResponse>> {
    if request.project_id.is_empty() {
        return Err(ControlError::validation(
            "Invalid request body. Project ID is required",
        ));
    }

    let project_id = ProjectId::new(&request.project_id);

    info!(
        project_id = %project_id,
        caller = %caller.0,
        "deployment requested"
    );

    let created = state
        .orchestrator
        .create_deployment(&project_id, &caller.0)
        .await?;

    Ok(ApiResponse::with_message(
        DeployResponse {
            deployment_id: created.deployment_id.to_string(),
            status: "Queued".to_owned(),
            url: created.url,
        },
        "Build queued successfully",
    ))
}

/// `GET /deployments/{id}` — fetch one deployment.
pub async fn get_deployment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ControlResult<ApiResponse<DeploymentDto>> {
    let deployment_id = DeploymentId::new(&id);

    let deployment = state
        .store
        .get_deployment_owned(&deployment_id, &caller.0)
        .await?
        .ok_or_else(|| ControlError::not_found(format!("Deployment not found: {id}")))?;

    Ok(ApiResponse::ok(deployment.into()))
}

/// `GET /deployments/{id}/logs` — fetch a deployment's build log.
pub async fn get_deployment_logs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ControlResult<ApiResponse<DeploymentLogsResponse>> {
    let deployment_id = DeploymentId::new(&id);

    let deployment = state
        .store
        .get_deployment_owned(&deployment_id, &caller.0)
        .await?
        .ok_or_else(|| ControlError::not_found(format!("Deployment not found: {id}")))?;

    let logs = state.store.logs_for_deployment(&deployment_id).await?;

    Ok(ApiResponse::ok(DeploymentLogsResponse {
        deployment: DeploymentSummary {
            id: deployment.id.to_string(),
            status: deployment.status.as_str().to_owned(),
        },
        logs: logs.into_iter().map(Into::into).collect(),
    }))
}

/// `GET /projects/{id}/deployments` — list a project's deployments.
pub async fn list_project_deployments(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ControlResult<ApiResponse<Vec<DeploymentDto>>> {
    let project_id = ProjectId::new(&id);

    state
        .store
        .get_project_owned(&project_id, &caller.0)
        .await?
        .ok_or_else(|| ControlError::not_found(format!("Project not found: {id}")))?;

    let deployments = state.store.list_deployments(&project_id).await?;

    Ok(ApiResponse::with_message(
        deployments.into_iter().map(Into::into).collect(),
        "Deployments fetched successfully.",
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::ServiceExt;

    use plinth_core::{sentinel, BuildMessage, OwnerId, Project};

    use crate::api::{router, AppState};
    use crate::config::{
        ArtifactStorageConfig, AuthConfig, BusConfig, DispatcherConfig, EdgeConfig,
        RateLimitConfig,
    };
    use crate::consumer::LogPipeline;
    use crate::dispatch::MockDispatcher;
    use crate::middleware::Claims;
    use crate::orchestrator::Orchestrator;
    use crate::store::{ControlStore, MemoryStore};

    const SECRET: &str = "test-secret-key-for-testing-only";

    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
    }

    fn token_for(sub: &str) -> String {
        let claims = Claims {
            sub: sub.to_owned(),
            exp: None,
            iat: None,
            iss: None,
            aud: None,
        };
        encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn auth_config() -> AuthConfig {
        AuthConfig {
            secret: SECRET.to_owned(),
            ..Default::default()
        }
    }

    async fn make_harness(rate_limit: Option<RateLimitConfig>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_project(&Project {
                id: plinth_core::ProjectId::new("proj-1"),
                name: "blog".to_owned(),
                git_url: "https://github.com/alice/blog.git".to_owned(),
                subdomain: "blog".to_owned(),
                custom_domain: None,
                owner_id: OwnerId::new("alice"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let dyn_store: Arc<dyn ControlStore> = Arc::clone(&store) as Arc<dyn ControlStore>;
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&dyn_store),
            Arc::new(MockDispatcher::new()),
            DispatcherConfig::default(),
            BusConfig::default(),
            ArtifactStorageConfig::default(),
            EdgeConfig::default(),
        ));

        let app = router(
            AppState {
                orchestrator,
                store: dyn_store,
            },
            &auth_config(),
            rate_limit.as_ref(),
        )
        .unwrap();

        Harness { app, store }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn deploy_request(token: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/deploy")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from("{\"project_id\": \"proj-1\"}"))
            .unwrap()
    }

    fn get_request(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn deploy_then_sentinels_walk_the_lifecycle() {
        let harness = make_harness(None).await;
        let token = token_for("alice");

        let response = harness
            .app
            .clone()
            .oneshot(deploy_request(&token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "Queued");
        assert_eq!(body["data"]["url"], "http://blog.localhost:8001");
        let deployment_id = body["data"]["deployment_id"].as_str().unwrap().to_owned();

        // Feed the bus messages a runner would publish.
        let pipeline =
            LogPipeline::new(Arc::clone(&harness.store) as Arc<dyn ControlStore>);
        let make = |log: &str| {
            BuildMessage::new(
                plinth_core::ProjectId::new("proj-1"),
                plinth_core::DeploymentId::new(&deployment_id),
                log,
            )
            .to_bytes()
            .unwrap()
        };

        pipeline.process(&make(sentinel::START_LINE)).await.unwrap();

        let response = harness
            .app
            .clone()
            .oneshot(get_request(&format!("/deployments/{deployment_id}"), &token))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"]["status"], "IN_PROGRESS");

        pipeline.process(&make(sentinel::SUCCESS_LINE)).await.unwrap();

        let response = harness
            .app
            .clone()
            .oneshot(get_request(&format!("/deployments/{deployment_id}"), &token))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["data"]["status"], "READY");
    }

    #[tokio::test]
    async fn deploy_unknown_project_is_404() {
        let harness = make_harness(None).await;
        let token = token_for("alice");

        let request = Request::builder()
            .method("POST")
            .uri("/deploy")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from("{\"project_id\": \"ghost\"}"))
            .unwrap();

        let response = harness.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn deploy_empty_project_id_is_400() {
        let harness = make_harness(None).await;
        let token = token_for("alice");

        let request = Request::builder()
            .method("POST")
            .uri("/deploy")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from("{}"))
            .unwrap();

        let response = harness.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn foreign_caller_cannot_see_deployments() {
        let harness = make_harness(None).await;
        let alice = token_for("alice");
        let mallory = token_for("mallory");

        let response = harness
            .app
            .clone()
            .oneshot(deploy_request(&alice))
            .await
            .unwrap();
        let body = json_body(response).await;
        let deployment_id = body["data"]["deployment_id"].as_str().unwrap().to_owned();

        let response = harness
            .app
            .clone()
            .oneshot(get_request(
                &format!("/deployments/{deployment_id}"),
                &mallory,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = harness
            .app
            .clone()
            .oneshot(get_request("/projects/proj-1/deployments", &mallory))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn logs_read_back_in_publish_order() {
        let harness = make_harness(None).await;
        let token = token_for("alice");

        let response = harness
            .app
            .clone()
            .oneshot(deploy_request(&token))
            .await
            .unwrap();
        let body = json_body(response).await;
        let deployment_id = body["data"]["deployment_id"].as_str().unwrap().to_owned();

        let pipeline =
            LogPipeline::new(Arc::clone(&harness.store) as Arc<dyn ControlStore>);
        let lines = [sentinel::START_LINE, "installing", "building"];
        for line in lines {
            let payload = BuildMessage::new(
                plinth_core::ProjectId::new("proj-1"),
                plinth_core::DeploymentId::new(&deployment_id),
                line,
            )
            .to_bytes()
            .unwrap();
            pipeline.process(&payload).await.unwrap();
        }

        let response = harness
            .app
            .clone()
            .oneshot(get_request(
                &format!("/deployments/{deployment_id}/logs"),
                &token,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["data"]["deployment"]["status"], "IN_PROGRESS");
        let logs: Vec<_> = body["data"]["logs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["log"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(logs, lines);
    }

    #[tokio::test]
    async fn list_deployments_newest_first() {
        let harness = make_harness(None).await;
        let token = token_for("alice");

        let first = json_body(
            harness
                .app
                .clone()
                .oneshot(deploy_request(&token))
                .await
                .unwrap(),
        )
        .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = json_body(
            harness
                .app
                .clone()
                .oneshot(deploy_request(&token))
                .await
                .unwrap(),
        )
        .await;

        let response = harness
            .app
            .clone()
            .oneshot(get_request("/projects/proj-1/deployments", &token))
            .await
            .unwrap();
        let body = json_body(response).await;

        let ids: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], second["data"]["deployment_id"].as_str().unwrap());
        assert_eq!(ids[1], first["data"]["deployment_id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn excess_deploys_are_rejected_immediately() {
        let harness = make_harness(Some(RateLimitConfig {
            requests_per_second: 1,
            burst_size: 1,
        }))
        .await;
        let token = token_for("alice");

        let with_ip = |req: Request<Body>| {
            let (mut parts, body) = req.into_parts();
            parts
                .headers
                .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
            Request::from_parts(parts, body)
        };

        let first = harness
            .app
            .clone()
            .oneshot(with_ip(deploy_request(&token)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = harness
            .app
            .clone()
            .oneshot(with_ip(deploy_request(&token)))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
