//! JWT authentication middleware.
//!
//! Validates the `Authorization: Bearer` token and makes the caller's
//! identity available to handlers as a request extension. Every
//! control-plane read and write enforces project ownership against that
//! identity.

use axum::http::StatusCode;
use http::{Request, Response};
use jsonwebtoken::{decode, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use plinth_core::OwnerId;

use crate::config::{AuthAlgorithm, AuthConfig};

/// Claims extracted from a valid JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
}

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct Caller(pub OwnerId);

/// Tower layer that validates JWT tokens in the Authorization header.
#[derive(Clone)]
pub struct AuthLayer {
    config: Arc<AuthConfig>,
}

impl AuthLayer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            config: Arc::new(config.clone()),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            config: self.config.clone(),
        }
    }
}

/// The service wrapper that performs JWT authentication.
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    config: Arc<AuthConfig>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AuthService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let config = self.config.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let auth_header = req
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok());

            let token = match auth_header {
                Some(header) if header.starts_with("Bearer ") => &header[7..],
                _ => {
                    tracing::debug!("missing or invalid Authorization header");
                    return Ok(unauthorized_response());
                }
            };

            match validate_token(token, &config) {
                Ok(token_data) => {
                    tracing::debug!(subject = %token_data.claims.sub, "JWT validated");
                    req.extensions_mut()
                        .insert(Caller(OwnerId::new(token_data.claims.sub)));
                    inner.call(req).await
                }
                Err(e) => {
                    tracing::debug!(error = %e, "JWT validation failed");
                    Ok(unauthorized_response())
                }
            }
        })
    }
}

fn validate_token(
    token: &str,
    config: &AuthConfig,
) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
    let algorithm = match config.algorithm {
        AuthAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
        AuthAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
        AuthAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
    };

    let mut validation = Validation::new(algorithm);

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    // Tokens without an exp claim are accepted; expiry is the identity
    // provider's concern in deployments that set one.
    validation.required_spec_claims.remove("exp");
    validation.validate_exp = false;

    let key = DecodingKey::from_secret(config.secret.as_bytes());
    decode::<Claims>(token, &key, &validation)
}

fn unauthorized_response<B: Default>() -> Response<B> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(
            http::header::WWW_AUTHENTICATE,
            "Bearer realm=\"plinth-control\"",
        )
        .body(B::default())
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::ServiceExt;

    fn test_config() -> AuthConfig {
        AuthConfig {
            secret: "test-secret-key-for-testing-only".to_owned(),
            algorithm: AuthAlgorithm::HS256,
            issuer: None,
            audience: None,
        }
    }

    pub(crate) fn create_token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_owned(),
            exp: None,
            iat: None,
            iss: None,
            aud: None,
        };
        let header = Header::new(jsonwebtoken::Algorithm::HS256);
        let key = EncodingKey::from_secret(secret.as_bytes());
        encode(&header, &claims, &key).unwrap()
    }

    async fn echo_caller(req: Request<Body>) -> Result<Response<Body>, std::convert::Infallible> {
        let caller = req.extensions().get::<Caller>().cloned();
        let body = caller.map_or_else(|| "none".to_owned(), |c| c.0.to_string());
        Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(body))
            .unwrap())
    }

    #[tokio::test]
    async fn rejects_missing_auth_header() {
        let config = test_config();
        let layer = AuthLayer::new(&config);
        let service = layer.layer(tower::service_fn(echo_caller));

        let req = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_invalid_token() {
        let config = test_config();
        let layer = AuthLayer::new(&config);
        let service = layer.layer(tower::service_fn(echo_caller));

        let req = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer invalid-token")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_token_signed_with_wrong_secret() {
        let config = test_config();
        let layer = AuthLayer::new(&config);
        let service = layer.layer(tower::service_fn(echo_caller));

        let token = create_token("alice", "a-different-secret");
        let req = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_exposes_the_caller() {
        let config = test_config();
        let layer = AuthLayer::new(&config);
        let service = layer.layer(tower::service_fn(echo_caller));

        let token = create_token("alice", &config.secret);
        let req = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"alice");
    }
}
