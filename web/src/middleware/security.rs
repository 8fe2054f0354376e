//! Authentication layers.
//!
//! [`AuthLayer`] wraps a service with an [`Authenticator`]. Requests whose
//! path starts with one of the public prefixes pass through untouched; the
//! others must be accepted by the authenticator or are answered with
//! `401 {"code": 401, "message": "Access denied", "details": null}`.
//!
//! Two authenticators are provided:
//!
//! - [`JwtAuthenticator`]: decodes the `Authorization: Bearer <token>` JWT
//!   and hands its claims to a registrator, which typically stores an auth
//!   context in the request extensions and may still refuse the request
//! - [`GatewayAuthenticator`]: for services behind a gateway that already
//!   authenticated the caller; the registrator reads whatever the gateway
//!   forwarded (headers) and decides

use crate::error::AppError;
use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Decides whether a request may reach the inner service.
pub trait Authenticator: Send + Sync {
    /// Accept (and possibly annotate) `request`.
    fn authenticate(&self, request: &mut Request) -> bool;
}

/// Receives the decoded claims; `false` denies the request.
pub type ClaimsRegistrator = Arc<dyn Fn(&mut Request, &Map<String, Value>) -> bool + Send + Sync>;

/// Inspects a gateway-authenticated request; `false` denies it.
pub type GatewayRegistrator = Arc<dyn Fn(&mut Request) -> bool + Send + Sync>;

/// Builds the response for denied requests.
pub type DeniedResponse = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// Bearer-token authentication.
///
/// The token signature and, when present, its `exp`/`nbf` claims are
/// checked; no claim is required and the audience is not validated.
/// Tokens with an empty claim set are refused.
#[derive(Clone)]
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
    registrator: ClaimsRegistrator,
}

impl JwtAuthenticator {
    /// HS256 authenticator using `secret`.
    #[must_use]
    pub fn new(secret: &str, registrator: ClaimsRegistrator) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Self::validation(Algorithm::HS256),
            registrator,
        }
    }

    /// Expect tokens signed with `algorithm`.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.validation = Self::validation(algorithm);
        self
    }

    fn validation(algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        validation
    }

    /// Token from the `Authorization` header, `Bearer` prefix removed.
    fn token(request: &Request) -> Option<String> {
        let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
        let token = header.replacen("Bearer", "", 1).trim().to_string();
        (!token.is_empty()).then_some(token)
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, request: &mut Request) -> bool {
        let Some(token) = Self::token(request) else {
            tracing::debug!("Missing bearer token");
            return false;
        };

        let claims = match decode::<Map<String, Value>>(&token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = %e, "JWT validation failed");
                return false;
            }
        };

        if claims.is_empty() {
            tracing::debug!("JWT carries no claims");
            return false;
        }

        (self.registrator)(request, &claims)
    }
}

/// Authentication already performed upstream.
#[derive(Clone)]
pub struct GatewayAuthenticator {
    registrator: GatewayRegistrator,
}

impl GatewayAuthenticator {
    /// Authenticator delegating to `registrator`.
    #[must_use]
    pub fn new(registrator: GatewayRegistrator) -> Self {
        Self { registrator }
    }
}

impl Authenticator for GatewayAuthenticator {
    fn authenticate(&self, request: &mut Request) -> bool {
        (self.registrator)(request)
    }
}

/// Tower layer guarding a service with an [`Authenticator`].
#[derive(Clone)]
pub struct AuthLayer<A> {
    authenticator: Arc<A>,
    public_paths: Arc<Vec<String>>,
    denied: DeniedResponse,
}

impl<A: Authenticator> AuthLayer<A> {
    /// Guard every path with `authenticator`.
    #[must_use]
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            public_paths: Arc::new(Vec::new()),
            denied: Arc::new(|_: &Request| AppError::unauthorized().into_response()),
        }
    }

    /// Let paths starting with any of `prefixes` through.
    #[must_use]
    pub fn public_paths<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_paths = Arc::new(prefixes.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the 401 envelope.
    #[must_use]
    pub fn denied_response(mut self, denied: DeniedResponse) -> Self {
        self.denied = denied;
        self
    }
}

impl<S, A> Layer<S> for AuthLayer<A> {
    type Service = AuthService<S, A>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
            public_paths: self.public_paths.clone(),
            denied: self.denied.clone(),
        }
    }
}

/// The service wrapper that performs authentication.
#[derive(Clone)]
pub struct AuthService<S, A> {
    inner: S,
    authenticator: Arc<A>,
    public_paths: Arc<Vec<String>>,
    denied: DeniedResponse,
}

impl<S, A> AuthService<S, A> {
    fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl<S, A> Service<Request> for AuthService<S, A>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    A: Authenticator + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        if self.is_public(req.uri().path()) {
            return Box::pin(self.inner.call(req));
        }

        if self.authenticator.authenticate(&mut req) {
            return Box::pin(self.inner.call(req));
        }

        tracing::info!(path = %req.uri().path(), "Access denied");
        let response = (self.denied)(&req);
        Box::pin(async move { Ok(response) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::{Body, to_bytes},
        extract::Extension,
        http::StatusCode,
        routing::get,
    };
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret-key-for-testing-only";

    #[derive(Clone, Debug)]
    struct Subject(String);

    fn token(claims: &Value, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn registrator() -> ClaimsRegistrator {
        Arc::new(|request: &mut Request, claims: &Map<String, Value>| {
            match claims.get("sub").and_then(Value::as_str) {
                Some("banned") | None => false,
                Some(sub) => {
                    request.extensions_mut().insert(Subject(sub.to_string()));
                    true
                }
            }
        })
    }

    fn app() -> Router {
        Router::new()
            .route("/me", get(|Extension(subject): Extension<Subject>| async move { subject.0 }))
            .route("/docs", get(|| async { "docs" }))
            .layer(AuthLayer::new(JwtAuthenticator::new(SECRET, registrator())).public_paths(["/docs"]))
    }

    async fn send(app: Router, uri: &str, authorization: Option<String>) -> (StatusCode, String) {
        let mut request = axum::http::Request::builder().uri(uri);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        let response = app.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_valid_token_registers_context() {
        let bearer = format!("Bearer {}", token(&json!({"sub": "ada"}), SECRET));
        let (status, body) = send(app(), "/me", Some(bearer)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ada");
    }

    #[tokio::test]
    async fn test_missing_token_is_denied_with_envelope() {
        let (status, body) = send(app(), "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            serde_json::from_str::<Value>(&body).unwrap(),
            json!({"code": 401, "message": "Access denied", "details": null})
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_is_denied() {
        let bearer = format!("Bearer {}", token(&json!({"sub": "ada"}), "other-secret"));
        let (status, _) = send(app(), "/me", Some(bearer)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_registrator_can_refuse() {
        let bearer = format!("Bearer {}", token(&json!({"sub": "banned"}), SECRET));
        let (status, _) = send(app(), "/me", Some(bearer)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_claims_are_denied() {
        let bearer = format!("Bearer {}", token(&json!({}), SECRET));
        let (status, _) = send(app(), "/me", Some(bearer)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_public_path_skips_authentication() {
        let (status, body) = send(app(), "/docs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "docs");
    }

    #[tokio::test]
    async fn test_gateway_authenticator() {
        let gateway = GatewayAuthenticator::new(Arc::new(|request: &mut Request| {
            request.headers().contains_key("x-user-id")
        }));
        let app = Router::new()
            .route("/me", get(|| async { "ok" }))
            .layer(AuthLayer::new(gateway));

        let denied = app
            .clone()
            .oneshot(axum::http::Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/me")
                    .header("x-user-id", "7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}
