//! Routes, endpoints and their mounting.
//!
//! # Serving one request
//!
//! ```text
//! HTTP request
//!     │  RequestContext (path params, query, body)
//!     ▼
//! RequestDescriber::build ──► commands ──► Pipeline::execute ──► MessageStream
//!                                                                     │
//!                                        ResponseDescriber::dispatch ◄┘
//!                                                 │
//!                         Some(response) ─────────┤
//!                         None ──► 204 No Content │
//!                         Err  ──► ExceptionHandler
//! ```
//!
//! A [`Route`] binds an [`Endpoint`] to a path and methods. [`Router`]
//! mounts routes on an `axum::Router`; [`RoutesRegistry`] collects them,
//! either one by one or by walking a [`RouteNamespace`] of route factories.

mod openapi;
mod registry;
mod router;

pub use openapi::{ApiInfo, document};
pub use registry::{DEFAULT_IGNORE_LIST, RouteFactory, RouteNamespace, RoutesRegistry};
pub use router::Router;

use crate::error::{EndpointError, ValidationErrors};
use crate::request::{RequestContext, RequestDescriber};
use crate::response::ResponseDescriber;
use crate::schema::ModelSchema;
use crate::state::AppState;
use axum::{
    body::to_bytes,
    extract::{FromRequestParts, Path, Request, rejection::PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cqea_core::PipelineRegistry;
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::error::Error as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Request describer, response describer and the pipeline between them.
#[derive(Debug, Clone)]
pub struct Endpoint {
    request: RequestDescriber,
    response: ResponseDescriber,
    pipeline: String,
}

impl Endpoint {
    /// Endpoint running the pipeline registered under `pipeline_code`.
    #[must_use]
    pub fn new(request: RequestDescriber, response: ResponseDescriber, pipeline_code: impl Into<String>) -> Self {
        Self {
            request,
            response,
            pipeline: pipeline_code.into(),
        }
    }

    /// Request side.
    #[must_use]
    pub const fn request(&self) -> &RequestDescriber {
        &self.request
    }

    /// Response side.
    #[must_use]
    pub const fn response(&self) -> &ResponseDescriber {
        &self.response
    }

    /// Code of the pipeline this endpoint runs.
    #[must_use]
    pub fn pipeline_code(&self) -> &str {
        &self.pipeline
    }

    /// Serve an already parsed request.
    ///
    /// No interceptor matching the result stream means `204 No Content`.
    ///
    /// # Errors
    ///
    /// - [`EndpointError::Pipeline`] if the pipeline code is not registered
    /// - [`EndpointError::Validation`] / [`EndpointError::Adapter`] if the
    ///   commands cannot be built
    /// - [`EndpointError::Response`] if the matched batch cannot be serialized
    pub async fn run(&self, ctx: &RequestContext, pipelines: &PipelineRegistry) -> Result<Response, EndpointError> {
        let pipeline = pipelines.get(&self.pipeline)?;
        let commands = self.request.build(ctx)?;
        tracing::debug!(commands = commands.len(), "Executing pipeline");

        let stream = pipeline.execute(commands);
        match self.response.dispatch(stream).await? {
            Some(response) => Ok(response),
            None => {
                tracing::debug!("No interceptor matched the result stream");
                Ok(StatusCode::NO_CONTENT.into_response())
            }
        }
    }

    /// Serve an HTTP request; failures go through the state's exception
    /// handler.
    pub async fn handle(&self, request: Request, state: &AppState) -> Response {
        let span = tracing::info_span!(
            "endpoint",
            pipeline = %self.pipeline,
            method = %request.method(),
            path = %request.uri().path(),
        );

        async move {
            let started = Instant::now();
            let outcome = match Self::context(request, state.body_limit()).await {
                Ok(ctx) => self.run(&ctx, state.pipelines()).await,
                Err(e) => Err(e),
            };

            let (response, label) = match outcome {
                Ok(response) => (response, "ok"),
                Err(error) => {
                    if error.is_client_error() {
                        tracing::debug!(error = %error, "Rejected request");
                    } else {
                        tracing::error!(error = %error, kind = error.kind(), "Endpoint failed");
                    }
                    (state.exceptions().handle(&error), error.kind())
                }
            };

            metrics::counter!("endpoint.requests", "pipeline" => self.pipeline.clone(), "outcome" => label)
                .increment(1);
            metrics::histogram!("endpoint.duration_seconds", "pipeline" => self.pipeline.clone())
                .record(started.elapsed().as_secs_f64());
            tracing::debug!(status = response.status().as_u16(), "Request served");
            response
        }
        .instrument(span)
        .await
    }

    async fn context(request: Request, body_limit: usize) -> Result<RequestContext, EndpointError> {
        let (mut parts, body) = request.into_parts();
        let path_params = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &()).await {
            Ok(Path(params)) => params,
            // Served outside an axum router: nothing was matched.
            Err(PathRejection::MissingPathParams(_)) => HashMap::new(),
            Err(rejection) => return Err(ValidationErrors::single(["path"], rejection.body_text()).into()),
        };
        let body = to_bytes(body, body_limit).await.map_err(|e| {
            let over_limit = std::iter::successors(e.source(), |&inner| inner.source())
                .any(|inner| inner.is::<LengthLimitError>());
            if over_limit {
                EndpointError::PayloadTooLarge { limit: body_limit }
            } else {
                EndpointError::Body(e.to_string())
            }
        })?;
        Ok(RequestContext::from_parts(&parts, path_params, body))
    }
}

/// An endpoint mounted on a path.
///
/// # Example
///
/// ```
/// use cqea_web::request::{RequestDescriber, RouteParameter};
/// use cqea_web::response::ResponseDescriber;
/// use cqea_web::routing::{Endpoint, Route};
/// use cqea_core::Message;
/// use cqea_web::error::AdapterError;
/// use cqea_web::request::BoundParameter;
///
/// let adapter = |_: &[BoundParameter<'_>]| -> Result<Vec<Box<dyn Message>>, AdapterError> { Ok(Vec::new()) };
/// let endpoint = Endpoint::new(
///     RequestDescriber::new(adapter).parameter(RouteParameter::new("id")),
///     ResponseDescriber::new(),
///     "users.delete",
/// );
///
/// let route = Route::new("/users/:id", endpoint)
///     .method("DELETE")
///     .tag("users")
///     .option("summary", "Delete a user");
///
/// assert_eq!(route.methods(), ["DELETE"]);
/// assert_eq!(route.options()["summary"], "Delete a user");
/// ```
#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    methods: Vec<String>,
    tags: Vec<String>,
    options: BTreeMap<String, Value>,
    endpoint: Arc<Endpoint>,
}

impl Route {
    /// Route for `endpoint` at `path` (axum syntax, `:name` for parameters).
    #[must_use]
    pub fn new(path: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            path: path.into(),
            methods: Vec::new(),
            tags: Vec::new(),
            options: BTreeMap::new(),
            endpoint: Arc::new(endpoint),
        }
    }

    /// Answer `method`.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }

    /// Answer each of `methods`.
    #[must_use]
    pub fn methods_from<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Add a documentation tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add an option passed through to the API document operation
    /// (`summary`, `description`, `deprecated`, ...).
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared methods, as given.
    #[must_use]
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Passthrough options.
    #[must_use]
    pub const fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }

    /// The endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Declared responses by status; a later declaration of a status
    /// replaces an earlier one.
    #[must_use]
    pub fn responses(&self) -> BTreeMap<StatusCode, Option<ModelSchema>> {
        self.endpoint.response().schema().into_iter().collect()
    }
}
