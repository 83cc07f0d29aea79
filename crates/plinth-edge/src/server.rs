//! Edge router server.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::EdgeConfig;
use crate::error::EdgeError;
use crate::proxy::{self, EdgeState};
use crate::resolver::PostgresResolver;

/// Creates the edge router.
///
/// `/health` is the only reserved path; every other request falls
/// through to the proxy and is routed solely by its Host header.
pub fn router(state: Arc<EdgeState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .fallback(proxy::proxy_request)
        .with_state(state)
}

/// Run the edge router.
pub async fn run(config: EdgeConfig, cancel: CancellationToken) -> Result<(), EdgeError> {
    let resolver = Arc::new(PostgresResolver::new(&config.database).await?);
    info!(url = %config.database.url, "connected to PostgreSQL");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.storage.request_timeout_secs))
        .build()?;

    let state = Arc::new(EdgeState {
        resolver,
        client,
        public_base_url: config.storage.public_base_url.clone(),
    });

    let app = router(state);

    let addr = config.server.bind_address;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(address = %addr, base = %config.storage.public_base_url, "edge router listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    info!("edge router shutdown complete");
    Ok(())
}

/// Health check endpoint.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::{header, StatusCode};
    use axum::response::IntoResponse;
    use chrono::Utc;
    use tower::ServiceExt;

    use plinth_core::{DeploymentId, DeploymentStatus, ProjectId};

    use crate::resolver::MemoryResolver;

    /// Stub object storage answering a fixed set of keys.
    async fn spawn_stub_storage() -> SocketAddr {
        let app = Router::new().fallback(|req: Request| async move {
            match req.uri().path() {
                "/proj-1/d2/index.html" => (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "text/html")],
                    "d2 index",
                )
                    .into_response(),
                "/proj-1/d2/app.js" => (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "text/javascript")],
                    "console.log(2)",
                )
                    .into_response(),
                "/proj-1/d1/index.html" => (StatusCode::OK, "d1 index").into_response(),
                _ => (StatusCode::NOT_FOUND, "no such key").into_response(),
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub storage");
        let addr = listener.local_addr().expect("stub storage addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub storage");
        });

        addr
    }

    async fn make_router() -> Router {
        let resolver = MemoryResolver::new();

        let project = ProjectId::new("proj-1");
        resolver.add_project(project.clone(), "blog", Some("www.example.com".to_owned()));
        resolver.add_deployment(
            DeploymentId::new("d1"),
            project.clone(),
            DeploymentStatus::Ready,
            Utc::now() - chrono::Duration::minutes(10),
        );
        resolver.add_deployment(
            DeploymentId::new("d2"),
            project.clone(),
            DeploymentStatus::Ready,
            Utc::now(),
        );

        // A project that has never finished a build.
        let pending = ProjectId::new("proj-2");
        resolver.add_project(pending.clone(), "pending", None);
        resolver.add_deployment(
            DeploymentId::new("d3"),
            pending,
            DeploymentStatus::InProgress,
            Utc::now(),
        );

        let storage_addr = spawn_stub_storage().await;

        let state = Arc::new(EdgeState {
            resolver: Arc::new(resolver),
            client: reqwest::Client::new(),
            public_base_url: format!("http://{storage_addr}"),
        });

        router(state)
    }

    fn request(host: &str, path: &str) -> Request {
        Request::builder()
            .uri(path)
            .header(header::HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn root_path_serves_newest_ready_deployment_index() {
        let app = make_router().await;

        let response = app
            .oneshot(request("blog.localhost:8001", "/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
        assert_eq!(body_string(response).await, "d2 index");
    }

    #[tokio::test]
    async fn non_root_paths_pass_through_unmodified() {
        let app = make_router().await;

        let response = app
            .oneshot(request("blog.localhost:8001", "/app.js"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "console.log(2)");
    }

    #[tokio::test]
    async fn storage_miss_passes_the_backend_404_through() {
        let app = make_router().await;

        let response = app
            .oneshot(request("blog.localhost:8001", "/missing.png"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        // No SPA fallback: the storage backend's own answer is returned.
        assert_eq!(body_string(response).await, "no such key");
    }

    #[tokio::test]
    async fn unknown_subdomain_is_404() {
        let app = make_router().await;

        let response = app
            .oneshot(request("ghost.localhost:8001", "/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn project_without_ready_deployment_is_404() {
        let app = make_router().await;

        let response = app
            .oneshot(request("pending.localhost:8001", "/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_domain_routes_to_the_same_site() {
        let app = make_router().await;

        let response = app.oneshot(request("www.example.com", "/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "d2 index");
    }

    #[tokio::test]
    async fn health_endpoint_answers_without_a_site() {
        let app = make_router().await;

        let response = app
            .oneshot(request("anything.localhost:8001", "/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("ok"));
    }
}
