//! Mounting routes on axum.

use super::Route;
use super::openapi::{ApiInfo, document};
use crate::error::RoutingError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Request, State},
    http::Method,
    routing::{MethodFilter, MethodRouter, get},
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Turns routes into an `axum::Router` sharing one [`AppState`].
///
/// Routes on the same path are combined into one method router. The API
/// document, when enabled, is served with `GET` at its own path.
///
/// # Example
///
/// ```ignore
/// let app = Router::new(AppState::new(pipelines))
///     .with_api_document("/openapi.json", ApiInfo::new("Users", "1.0.0"))
///     .mount(&registry)?;
/// axum::serve(listener, app).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Router {
    state: AppState,
    api_document: Option<(String, ApiInfo)>,
}

impl Router {
    /// Router serving endpoints with `state`.
    #[must_use]
    pub const fn new(state: AppState) -> Self {
        Self {
            state,
            api_document: None,
        }
    }

    /// Also serve the API document of the mounted routes at `path`.
    #[must_use]
    pub fn with_api_document(mut self, path: impl Into<String>, info: ApiInfo) -> Self {
        self.api_document = Some((path.into(), info));
        self
    }

    /// Mount `routes`.
    ///
    /// # Errors
    ///
    /// - [`RoutingError::InvalidPath`] for paths not starting with `/`
    /// - [`RoutingError::NoMethods`] for routes without methods
    /// - [`RoutingError::InvalidMethod`] for methods axum cannot route
    /// - [`RoutingError::Duplicate`] when a method is declared twice on a path
    pub fn mount<'a, I>(&self, routes: I) -> Result<axum::Router, RoutingError>
    where
        I: IntoIterator<Item = &'a Route>,
    {
        let routes: Vec<&Route> = routes.into_iter().collect();
        let mut paths: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();
        let mut declared: BTreeSet<(String, String)> = BTreeSet::new();

        for route in &routes {
            let path = route.path().to_string();
            if !path.starts_with('/') {
                return Err(RoutingError::InvalidPath(path));
            }
            if route.methods().is_empty() {
                return Err(RoutingError::NoMethods(path));
            }

            let mut filter: Option<MethodFilter> = None;
            for name in route.methods() {
                let method = parse_method(name)?;
                if !declared.insert((path.clone(), method.to_string())) {
                    return Err(RoutingError::Duplicate {
                        method: method.to_string(),
                        path,
                    });
                }
                let method_filter =
                    MethodFilter::try_from(method).map_err(|_| RoutingError::InvalidMethod(name.clone()))?;
                filter = Some(filter.map_or(method_filter, |f| f.or(method_filter)));
            }
            let Some(filter) = filter else {
                return Err(RoutingError::NoMethods(path));
            };

            let endpoint = route.endpoint().clone();
            let handler = move |State(state): State<AppState>, request: Request| async move {
                endpoint.handle(request, &state).await
            };

            tracing::debug!(path = %path, methods = ?route.methods(), pipeline = route.endpoint().pipeline_code(), "Mounting route");
            let method_router = match paths.remove(&path) {
                Some(existing) => existing.on(filter, handler),
                None => axum::routing::on(filter, handler),
            };
            paths.insert(path, method_router);
        }

        if let Some((path, info)) = &self.api_document {
            if !path.starts_with('/') {
                return Err(RoutingError::InvalidPath(path.clone()));
            }
            if !declared.insert((path.clone(), Method::GET.to_string())) {
                return Err(RoutingError::Duplicate {
                    method: Method::GET.to_string(),
                    path: path.clone(),
                });
            }
            let api = Arc::new(document(info, routes.iter().copied()));
            let serve = move || async move { Json(api.as_ref().clone()) };
            let method_router = match paths.remove(path) {
                Some(existing) => existing.get(serve),
                None => get(serve),
            };
            paths.insert(path.clone(), method_router);
        }

        let router = paths
            .into_iter()
            .fold(axum::Router::new(), |router, (path, method_router)| router.route(&path, method_router));
        tracing::info!(routes = routes.len(), "Routes mounted");
        Ok(router.with_state(self.state.clone()))
    }
}

fn parse_method(name: &str) -> Result<Method, RoutingError> {
    Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| RoutingError::InvalidMethod(name.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::request::{BoundParameter, RequestDescriber};
    use crate::response::{Interceptor, ResponseDescriber};
    use crate::routing::Endpoint;
    use axum::body::{Body, to_bytes};
    use axum::http::StatusCode;
    use cqea_core::{Message, MessageKind, MessageStream, PipelineRegistry};
    use futures::{StreamExt, stream};
    use serde_json::Value;
    use tower::ServiceExt;

    #[derive(Debug)]
    struct Done;

    impl Message for Done {
        fn kind(&self) -> MessageKind {
            MessageKind::Event
        }
    }

    fn no_commands(_: &[BoundParameter<'_>]) -> Result<Vec<Box<dyn Message>>, AdapterError> {
        Ok(Vec::new())
    }

    fn route(path: &str, methods: &[&str], status: StatusCode) -> Route {
        let endpoint = Endpoint::new(
            RequestDescriber::new(no_commands),
            ResponseDescriber::new().interceptor(Interceptor::catch::<Done>().status(status)),
            "done",
        );
        Route::new(path, endpoint).methods_from(methods.iter().copied())
    }

    fn router() -> Router {
        let pipelines = PipelineRegistry::new().with_pipeline("done", |_: Vec<Box<dyn Message>>| -> MessageStream {
            stream::iter(vec![Box::new(Done) as Box<dyn Message>]).boxed()
        });
        Router::new(AppState::new(pipelines))
    }

    async fn call(app: axum::Router, method: &str, uri: &str) -> StatusCode {
        app.oneshot(axum::http::Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_routes_on_one_path_share_a_method_router() {
        let routes = [
            route("/items", &["get"], StatusCode::OK),
            route("/items", &["POST"], StatusCode::CREATED),
        ];
        let app = router().mount(&routes).unwrap();

        assert_eq!(call(app.clone(), "GET", "/items").await, StatusCode::OK);
        assert_eq!(call(app.clone(), "POST", "/items").await, StatusCode::CREATED);
        assert_eq!(call(app, "DELETE", "/items").await, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_api_document_route() {
        let routes = [route("/items/:id", &["GET"], StatusCode::OK)];
        let app = router()
            .with_api_document("/openapi.json", ApiInfo::new("Items", "1.0.0"))
            .mount(&routes)
            .unwrap();

        let response = app
            .oneshot(axum::http::Request::builder().uri("/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let api: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(api["paths"]["/items/{id}"]["get"].is_object());
    }

    #[test]
    fn test_mount_errors() {
        let invalid = [route("/items", &["FETCH ME"], StatusCode::OK)];
        assert_eq!(
            router().mount(&invalid).unwrap_err(),
            RoutingError::InvalidMethod("FETCH ME".into())
        );

        let none = [route("/items", &[], StatusCode::OK)];
        assert_eq!(router().mount(&none).unwrap_err(), RoutingError::NoMethods("/items".into()));

        let relative = [route("items", &["GET"], StatusCode::OK)];
        assert_eq!(router().mount(&relative).unwrap_err(), RoutingError::InvalidPath("items".into()));

        let twice = [
            route("/items", &["GET"], StatusCode::OK),
            route("/items", &["get"], StatusCode::OK),
        ];
        assert_eq!(
            router().mount(&twice).unwrap_err(),
            RoutingError::Duplicate {
                method: "GET".into(),
                path: "/items".into()
            }
        );
    }
}
