//! Axum adaptation layer for CQEA message pipelines.
//!
//! Routes are declared in terms of messages instead of HTTP primitives: a
//! request describer turns the HTTP request into commands, a pipeline
//! (external to this crate) executes them, and a response describer picks
//! the HTTP response from the stream of resulting messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  axum Router  (mounted by routing::Router)               │
//! │   AuthLayer ─ panic_layer ─ Endpoint::handle             │
//! ├──────────────────────────────────────────────────────────┤
//! │  request::RequestDescriber                               │  ← Parameters, adapter
//! │      │ Vec<Box<dyn Message>>                             │
//! │      ▼                                                   │
//! │  cqea_core::Pipeline (external)                          │  ← commands in, stream out
//! │      │ MessageStream                                     │
//! │      ▼                                                   │
//! │  response::ResponseDescriber                             │  ← batches, interceptors
//! │      │ Option<Response>  (None → 204)                    │
//! ├──────────────────────────────────────────────────────────┤
//! │  middleware::ExceptionHandler                            │  ← 422 / 500 envelopes
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cqea_web::prelude::*;
//!
//! let factory = InterceptorFactory::new().map_error::<UserExists>(StatusCode::CONFLICT);
//!
//! let endpoint = Endpoint::new(
//!     RequestDescriber::new(DeclarativeAdapter::<CreateUser>::new())
//!         .parameter(ModelParameter::<NewUser>::new()),
//!     ResponseDescriber::new()
//!         .interceptor(factory.event::<UserCreated, User>())
//!         .interceptor(factory.error(StatusCode::CONFLICT)?),
//!     "users.create",
//! );
//!
//! let mut registry = RoutesRegistry::new();
//! registry.register_route(Route::new("/users", endpoint).method("POST").tag("users"));
//!
//! let app = Router::new(AppState::new(pipelines)).mount(&registry)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod interceptors;
pub mod middleware;
pub mod request;
pub mod response;
pub mod routing;
pub mod schema;
pub mod serializing;
pub mod state;

// Re-export key types for convenience
pub use config::{ConfigError, WebConfig};
pub use error::{AppError, EndpointError, ErrorEnvelope, ValidationError, ValidationErrors};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Everything needed to declare routes.
pub mod prelude {
    pub use crate::error::{AdapterError, AppError, EndpointError, ParameterError};
    pub use crate::interceptors::InterceptorFactory;
    pub use crate::middleware::security::{AuthLayer, GatewayAuthenticator, JwtAuthenticator};
    pub use crate::middleware::{ExceptionHandler, JsonExceptionHandler, panic_layer};
    pub use crate::request::{
        BoundParameter, DeclarativeAdapter, ModelParameter, Parameter, QueryModel, QueryParameter,
        RequestDescriber, RequestParameter, RouteParameter, Serialized,
    };
    pub use crate::response::{DrainPolicy, ErrorInterceptor, Interceptor, JsonResponder, ResponseDescriber};
    pub use crate::routing::{ApiInfo, Endpoint, Route, RouteNamespace, Router, RoutesRegistry};
    pub use crate::schema::{make_request_schema, make_response_schema, make_response_schema_many};
    pub use crate::serializing::{ResponseMapping, ViewMapping, json_serializer, typed_serializer};
    pub use crate::state::AppState;
    pub use axum::http::StatusCode;
}
