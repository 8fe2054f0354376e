//! Request side: from an HTTP request to outgoing command messages.
//!
//! ```text
//!                     ┌──────────── RequestDescriber ────────────┐
//! HTTP request ──►    │ Parameter::extract  (per parameter)      │
//! RequestContext      │      │  Option<Value>                    │
//!                     │      ▼                                   │
//!                     │ BoundParameter ──► RequestAdapter::adapt │ ──► Vec<Box<dyn Message>>
//!                     └──────────────────────────────────────────┘
//! ```
//!
//! Parameters are declared once per route and never hold request state:
//! `extract` reads a value out of the [`RequestContext`], `serialize` turns
//! that value into fields. A [`BoundParameter`] pairs the two for the
//! duration of one request.

mod adapter;
mod parameters;

pub use adapter::{DeclarativeAdapter, RequestAdapter, compose};
pub use parameters::{ModelParameter, QueryModel, QueryParameter, RequestParameter, RouteParameter};

use crate::error::{EndpointError, ParameterError, ValidationErrors};
use crate::schema::ModelSchema;
use axum::body::Bytes;
use cqea_core::Message;
use http::{HeaderMap, Method, request::Parts};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Everything parameters may read from one request.
///
/// Built once per request by the endpoint; parameters only borrow it.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    method: Method,
    path: String,
    headers: HeaderMap,
    path_params: HashMap<String, String>,
    query: Option<String>,
    body: Bytes,
}

impl RequestContext {
    /// Context for `method path` with no headers, parameters or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Context from request parts, matched path parameters and the body.
    #[must_use]
    pub fn from_parts(parts: &Parts, path_params: HashMap<String, String>, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            headers: parts.headers.clone(),
            path_params,
            query: parts.uri.query().map(str::to_string),
            body,
        }
    }

    /// Set the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add a matched path parameter.
    #[must_use]
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Set the raw query string (without `?`).
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body.
    #[must_use]
    pub fn with_json(self, body: &Value) -> Self {
        self.with_body(body.to_string())
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Matched path parameter `name`.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Decoded query pairs in order; malformed strings decode to nothing.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .and_then(|raw| serde_urlencoded::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// Last value of query parameter `name`.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Body parsed as JSON; `None` when the body is empty.
    ///
    /// # Errors
    ///
    /// Returns a validation error located at `body` for malformed JSON.
    pub fn json_body(&self) -> Result<Option<Value>, ValidationErrors> {
        if self.body.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&self.body)
            .map(Some)
            .map_err(|e| ValidationErrors::single(["body"], format!("invalid JSON: {e}")))
    }

    /// JSON view of the request line and headers.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        json!({
            "method": self.method.as_str(),
            "path": self.path,
            "query": self.query,
            "path_params": self.path_params,
            "headers": headers,
        })
    }
}

/// Where a parameter reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterSource {
    /// A matched path segment.
    Path,
    /// The query string.
    Query,
    /// The JSON body.
    Body,
    /// The request itself.
    Request,
}

impl ParameterSource {
    /// Lowercase name, as used by the API document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Body => "body",
            Self::Request => "request",
        }
    }
}

/// Output of a parameter serializer.
#[derive(Debug, Clone, PartialEq)]
pub enum Serialized {
    /// Fields merged into every outgoing message.
    Fields(Map<String, Value>),
    /// One outgoing message per element.
    FanOut(Vec<Map<String, Value>>),
}

impl Serialized {
    /// `{name: value}`.
    #[must_use]
    pub fn field(name: impl Into<String>, value: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(name.into(), value);
        Self::Fields(fields)
    }
}

/// Custom parameter serialization.
pub type ParameterSerializer =
    Arc<dyn Fn(&Value) -> Result<Serialized, ParameterError> + Send + Sync>;

/// A named input of a route.
///
/// # Example
///
/// ```
/// use axum::http::Method;
/// use cqea_core::ScalarType;
/// use cqea_web::request::{Parameter, RequestContext, RouteParameter, Serialized};
/// use serde_json::json;
///
/// let id = RouteParameter::new("id").cast(ScalarType::Integer);
/// let ctx = RequestContext::new(Method::GET, "/users/7").with_path_param("id", "7");
///
/// let value = id.extract(&ctx).unwrap().unwrap();
/// assert_eq!(id.serialize(&value).unwrap(), Serialized::field("id", json!(7)));
/// ```
pub trait Parameter: Send + Sync {
    /// Unique name within a route.
    fn name(&self) -> &str;

    /// Where the value comes from.
    fn source(&self) -> ParameterSource;

    /// Declared type, for the API document.
    fn declared_type(&self) -> String;

    /// Wrapper model documented as the request body, if any.
    fn schema(&self) -> Option<ModelSchema> {
        None
    }

    /// Read this parameter's value from the request.
    ///
    /// `Ok(None)` leaves the parameter unbound.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] when the value is present but invalid.
    fn extract(&self, ctx: &RequestContext) -> Result<Option<Value>, ValidationErrors>;

    /// Turn an extracted value into message fields.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when the value cannot be serialized.
    fn serialize(&self, value: &Value) -> Result<Serialized, ParameterError>;
}

/// A parameter and its value for one request.
pub struct BoundParameter<'a> {
    parameter: &'a dyn Parameter,
    value: Option<Value>,
}

impl<'a> BoundParameter<'a> {
    /// Pair `parameter` with `value` (`None` = unbound).
    #[must_use]
    pub fn new(parameter: &'a dyn Parameter, value: Option<Value>) -> Self {
        Self { parameter, value }
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.parameter.name()
    }

    /// Bound value.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Serialize the bound value.
    ///
    /// # Errors
    ///
    /// [`ParameterError::MissingValue`] when unbound, otherwise whatever the
    /// parameter's serializer returns.
    pub fn serialize(&self) -> Result<Serialized, ParameterError> {
        match &self.value {
            Some(value) => self.parameter.serialize(value),
            None => Err(ParameterError::MissingValue(self.name().to_string())),
        }
    }
}

impl fmt::Debug for BoundParameter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundParameter")
            .field("name", &self.name())
            .field("value", &self.value)
            .finish()
    }
}

/// An adapter plus the ordered parameters it consumes.
#[derive(Clone)]
pub struct RequestDescriber {
    parameters: Vec<Arc<dyn Parameter>>,
    adapter: Arc<dyn RequestAdapter>,
}

impl RequestDescriber {
    /// Describe a request by its adapter; add parameters with
    /// [`parameter`](Self::parameter).
    #[must_use]
    pub fn new(adapter: impl RequestAdapter + 'static) -> Self {
        Self {
            parameters: Vec::new(),
            adapter: Arc::new(adapter),
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: impl Parameter + 'static) -> Self {
        self.parameters.push(Arc::new(parameter));
        self
    }

    /// Declared parameters, in order.
    #[must_use]
    pub fn parameters(&self) -> &[Arc<dyn Parameter>] {
        &self.parameters
    }

    /// Bind every parameter against `ctx` and run the adapter.
    ///
    /// Extraction errors of all parameters are collected before failing.
    ///
    /// # Errors
    ///
    /// [`EndpointError::Validation`] for client errors, otherwise the
    /// adapter's error.
    pub fn build(&self, ctx: &RequestContext) -> Result<Vec<Box<dyn Message>>, EndpointError> {
        let mut errors = ValidationErrors::new();
        let mut bound = Vec::with_capacity(self.parameters.len());

        for parameter in &self.parameters {
            match parameter.extract(ctx) {
                Ok(value) => bound.push(BoundParameter::new(parameter.as_ref(), value)),
                Err(e) => errors.append(e),
            }
        }

        if !errors.is_empty() {
            return Err(EndpointError::Validation(errors));
        }
        Ok(self.adapter.adapt(&bound)?)
    }
}

impl fmt::Debug for RequestDescriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.parameters.iter().map(|p| p.name()).collect();
        f.debug_struct("RequestDescriber")
            .field("parameters", &names)
            .finish_non_exhaustive()
    }
}
