//! Reverse proxy from inbound hosts to stored artifacts.
//!
//! The read path per request: take the left-most Host label as the
//! subdomain, resolve it to the owning project's latest READY
//! deployment, and proxy to the deployment's artifact base in object
//! storage. A root path is rewritten to the default document; every
//! other path passes through unmodified, and whatever the storage
//! backend answers (including its 404s) is returned verbatim.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::response::Response;
use tracing::debug;

use crate::error::EdgeError;
use crate::resolver::{RoutedSite, SiteResolver};

/// Shared edge router state.
#[derive(Debug)]
pub struct EdgeState {
    /// Host-to-site resolver.
    pub resolver: Arc<dyn SiteResolver>,
    /// Upstream HTTP client.
    pub client: reqwest::Client,
    /// Public artifact base URL, including the bucket.
    pub public_base_url: String,
}

/// Upstream response headers forwarded to the visitor.
const FORWARDED_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CACHE_CONTROL,
    header::ETAG,
    header::LAST_MODIFIED,
];

/// Strip any port suffix from a Host header value.
#[must_use]
pub fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

/// Extract the left-most label of a hostname.
///
/// Returns `None` for bare hostnames without a dot; those cannot carry a
/// subdomain.
#[must_use]
pub fn extract_subdomain(host: &str) -> Option<&str> {
    let host = strip_port(host);
    let mut parts = host.split('.');
    let first = parts.next()?;
    if first.is_empty() {
        return None;
    }
    parts.next().is_some().then_some(first)
}

/// Rewrite a root path to the default document.
#[must_use]
pub fn rewrite_path(path: &str) -> &str {
    if path.is_empty() || path == "/" {
        "/index.html"
    } else {
        path
    }
}

/// Fallback handler proxying every unmatched request.
pub async fn proxy_request(
    State(state): State<Arc<EdgeState>>,
    req: Request,
) -> Result<Response, EdgeError> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .ok_or(EdgeError::MissingHost)?;

    let site = resolve_host(&state, host).await?;

    let path = rewrite_path(req.uri().path());
    let path_and_query = match req.uri().query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    };

    let target = format!(
        "{}/{}/{}{}",
        state.public_base_url.trim_end_matches('/'),
        site.project_id,
        site.deployment_id,
        path_and_query
    );

    debug!(
        host = %host,
        path = %req.uri().path(),
        target = %target,
        "proxying request"
    );

    let upstream = state
        .client
        .request(req.method().clone(), &target)
        .send()
        .await?;

    let mut builder = Response::builder().status(upstream.status());
    for name in FORWARDED_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| EdgeError::Internal(format!("failed to build response: {e}")))
}

/// Resolve a Host header value to a routed site.
///
/// Subdomain routing is tried first; a full-host custom domain match is
/// the fallback. Both misses surface as a plain not-found.
async fn resolve_host(state: &EdgeState, host: &str) -> Result<RoutedSite, EdgeError> {
    if let Some(subdomain) = extract_subdomain(host) {
        if let Some(site) = state.resolver.resolve_subdomain(subdomain).await? {
            return Ok(site);
        }
    }

    if let Some(site) = state
        .resolver
        .resolve_custom_domain(strip_port(host))
        .await?
    {
        return Ok(site);
    }

    Err(EdgeError::SiteNotFound(host.to_owned()))
}
