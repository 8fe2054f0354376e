//! Error types for the adaptation layer.
//!
//! Errors fall into three groups:
//!
//! - **Configuration errors** (unregistered pipeline, unbound parameter,
//!   message that cannot be constructed): a wiring mistake, answered with 500
//! - **Validation errors** (malformed body, uncastable path value): the
//!   client's fault, answered with 422 and a nested `details` tree
//! - **Domain errors**: not errors here at all; they are messages in the
//!   result stream, handled by interceptors
//!
//! Every error leaves the service as the same JSON envelope:
//!
//! ```json
//! {"code": 422, "message": "Validation Error", "details": {"body": {"data": {"name": "Field required"}}}}
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cqea_core::{CastError, NotationError, PipelineError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Message used for every 422 envelope.
pub const VALIDATION_ERROR_MESSAGE: &str = "Validation Error";

/// Message used for every 401 envelope.
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied";

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// HTTP status code, repeated in the body.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Structured details, `null` when there are none.
    pub details: Option<Value>,
}

/// Application error rendered as an [`ErrorEnvelope`].
///
/// # Examples
///
/// ```
/// use axum::http::StatusCode;
/// use cqea_web::{AppError, ValidationErrors};
///
/// let errors = ValidationErrors::single(["path", "id"], "not an integer");
/// let err = AppError::validation(&errors);
///
/// assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
/// assert_eq!(err.envelope().message, "Validation Error");
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Envelope details
    details: Option<Value>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error without details.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Attach envelope details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 401 "Access denied" error with `null` details.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ACCESS_DENIED_MESSAGE)
    }

    /// Create a 422 error whose details nest every error under its location.
    #[must_use]
    pub fn validation(errors: &ValidationErrors) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, VALIDATION_ERROR_MESSAGE)
            .with_details(errors.to_details())
    }

    /// Create a 500 error; `kind` names the failure in `details.type`.
    #[must_use]
    pub fn internal(message: impl Into<String>, kind: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
            .with_details(serde_json::json!({ "type": kind }))
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Body of the response this error renders to.
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.status.as_u16(),
            message: self.message.clone(),
            details: self.details.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        (self.status, Json(self.envelope())).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string(), "Error").with_source(err)
    }
}

/// One failed check, located by a path into the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Location path, e.g. `["body", "data", "name"]`.
    pub loc: Vec<String>,
    /// What went wrong.
    pub msg: String,
}

impl ValidationError {
    /// Create an error at `loc`.
    pub fn new<I, S>(loc: I, msg: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            loc: loc.into_iter().map(Into::into).collect(),
            msg: msg.into(),
        }
    }
}

/// A non-empty set of validation failures collected for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// An empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// A set holding one error.
    pub fn single<I, S>(loc: I, msg: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(vec![ValidationError::new(loc, msg)])
    }

    /// Add an error.
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// Move all errors of `other` into this set.
    pub fn append(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Whether no error was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the errors in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Details tree: each message nested under its location path, trees of
    /// errors sharing a prefix merged together.
    ///
    /// ```
    /// use cqea_web::ValidationErrors;
    /// use serde_json::json;
    ///
    /// let mut errors = ValidationErrors::single(["body", "name"], "field required");
    /// errors.append(ValidationErrors::single(["body", "age"], "not an integer"));
    ///
    /// assert_eq!(
    ///     errors.to_details(),
    ///     json!({"body": {"name": "field required", "age": "not an integer"}})
    /// );
    /// ```
    #[must_use]
    pub fn to_details(&self) -> Value {
        let mut details = Map::new();
        for error in &self.0 {
            merge(&mut details, nestify(&error.loc, &error.msg));
        }
        Value::Object(details)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.loc.join("."), error.msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

/// `["a", "b"]`, `"msg"` → `{"a": {"b": "msg"}}`.
///
/// An empty location is filed under `"request"`.
#[must_use]
pub fn nestify(loc: &[String], msg: &str) -> Map<String, Value> {
    let (head, rest) = match loc.split_first() {
        Some((head, rest)) => (head.clone(), rest),
        None => ("request".to_string(), &[][..]),
    };

    let leaf = rest
        .iter()
        .rev()
        .fold(Value::String(msg.to_string()), |acc, key| {
            let mut map = Map::new();
            map.insert(key.clone(), acc);
            Value::Object(map)
        });

    let mut root = Map::new();
    root.insert(head, leaf);
    root
}

/// Recursively merge `other` into `target`; on a non-object clash the
/// newer value wins.
pub fn merge(target: &mut Map<String, Value>, other: Map<String, Value>) {
    for (key, value) in other {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge(existing, incoming),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Errors raised while serializing a bound parameter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// The parameter was never bound for this request.
    #[error("No value set for parameter {0}")]
    MissingValue(String),

    /// The parameter has no default serialization.
    #[error(
        "No default handler function for {0}. You must provide a custom handler function or do not use this parameter."
    )]
    NotImplemented(String),

    /// The bound value was rejected (cast or notation failure).
    #[error("{0}")]
    Invalid(ValidationErrors),

    /// The bound value does not have the shape the serializer expects.
    #[error("cannot serialize parameter {name}: {reason}")]
    Serialize {
        /// Parameter name.
        name: String,
        /// What was wrong with the value.
        reason: String,
    },
}

impl ParameterError {
    /// A notation failure on query parameter `name`.
    #[must_use]
    pub fn notation(name: &str, error: &NotationError) -> Self {
        let loc = match error {
            NotationError::InvalidValue { field, .. } => vec!["query".to_string(), field.clone()],
            NotationError::Malformed(_) => vec!["query".to_string(), name.to_string()],
        };
        Self::Invalid(ValidationError::new(loc, error.to_string()).into())
    }
}

/// Errors raised while turning bound parameters into messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// A parameter failed to serialize.
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// A field listed in the type-cast map held an uncastable value.
    #[error("invalid value for field {field}: {source}")]
    Cast {
        /// Field name.
        field: String,
        /// Underlying cast failure.
        #[source]
        source: CastError,
    },

    /// The merged fields do not build the target message.
    #[error("cannot construct {message_type}: {reason}")]
    Construct {
        /// Target message type.
        message_type: String,
        /// Deserializer complaint.
        reason: String,
    },
}

/// Errors raised while serializing result messages.
#[derive(Error, Debug)]
pub enum ResponseError {
    /// A typed serializer received a message of another type.
    #[error("serializer for {expected} received {found}")]
    UnexpectedType {
        /// Type the serializer was written for.
        expected: String,
        /// Type it received.
        found: String,
    },

    /// The message has no JSON form.
    #[error("message {0} has no JSON form")]
    NotSerializable(String),

    /// JSON encoding failed.
    #[error("failed to encode response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while building interceptors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterceptorError {
    /// No error type is mapped to the status code.
    #[error("no error type mapped to status {0}")]
    UnmappedStatus(u16),
}

/// Errors raised while mounting routes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The method name is not an HTTP method axum can route.
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    /// The route declares no method at all.
    #[error("route {0} declares no methods")]
    NoMethods(String),

    /// Paths must start with `/`.
    #[error("invalid route path '{0}'")]
    InvalidPath(String),

    /// Two routes answer the same method on the same path.
    #[error("{method} {path} is declared more than once")]
    Duplicate {
        /// HTTP method.
        method: String,
        /// Route path.
        path: String,
    },
}

/// Everything that can fail while an endpoint serves a request.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// The endpoint refers to an unknown pipeline code.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Parameters could not be extracted from the request.
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Messages could not be built from the parameters.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// A matched batch could not be serialized.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// The request body is larger than the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Body limit in bytes.
        limit: usize,
    },
}

impl EndpointError {
    /// Short name of the failure, exposed as `details.type`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Pipeline(_) => "PipelineNotRegistered",
            Self::Validation(_) => "ValidationError",
            Self::Adapter(AdapterError::Parameter(ParameterError::MissingValue(_))) => "MissingValue",
            Self::Adapter(AdapterError::Parameter(ParameterError::NotImplemented(_))) => "NotImplemented",
            Self::Adapter(AdapterError::Parameter(ParameterError::Invalid(_))) => "ValidationError",
            Self::Adapter(AdapterError::Parameter(ParameterError::Serialize { .. })) => "ParameterError",
            Self::Adapter(AdapterError::Cast { .. }) => "CastError",
            Self::Adapter(AdapterError::Construct { .. }) => "ConstructionError",
            Self::Response(_) => "ResponseError",
            Self::Body(_) => "BodyError",
            Self::PayloadTooLarge { .. } => "PayloadTooLarge",
        }
    }

    /// Whether the client is at fault (4xx) rather than the service.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::PayloadTooLarge { .. }) || self.validation_errors().is_some()
    }

    /// Client-side failures, if this error is one.
    #[must_use]
    pub fn validation_errors(&self) -> Option<ValidationErrors> {
        match self {
            Self::Validation(errors)
            | Self::Adapter(AdapterError::Parameter(ParameterError::Invalid(errors))) => {
                Some(errors.clone())
            }
            Self::Adapter(AdapterError::Cast { field, source }) => Some(ValidationErrors::single(
                ["body", field.as_str()],
                source.to_string(),
            )),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for EndpointError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<ParameterError> for EndpointError {
    fn from(error: ParameterError) -> Self {
        Self::Adapter(AdapterError::Parameter(error))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cqea_core::ScalarType;
    use serde_json::json;

    fn loc(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_error_display() {
        let err = AppError::new(StatusCode::BAD_REQUEST, "Invalid input");
        assert_eq!(err.to_string(), "[400] Invalid input");
    }

    #[test]
    fn test_unauthorized_envelope() {
        let envelope = AppError::unauthorized().envelope();
        assert_eq!(
            serde_json::to_value(envelope).unwrap(),
            json!({"code": 401, "message": "Access denied", "details": null})
        );
    }

    #[test]
    fn test_internal_envelope() {
        let envelope = AppError::internal("boom", "RuntimeError").envelope();
        assert_eq!(
            serde_json::to_value(envelope).unwrap(),
            json!({"code": 500, "message": "boom", "details": {"type": "RuntimeError"}})
        );
    }

    #[test]
    fn test_nestify() {
        assert_eq!(
            Value::Object(nestify(&loc(&["body", "data", "name"]), "field required")),
            json!({"body": {"data": {"name": "field required"}}})
        );
        assert_eq!(
            Value::Object(nestify(&[], "bad")),
            json!({"request": "bad"})
        );
    }

    #[test]
    fn test_merge_shares_prefixes() {
        let mut errors = ValidationErrors::single(["body", "data", "name"], "field required");
        errors.push(ValidationError::new(["body", "data", "age"], "not an integer"));
        errors.push(ValidationError::new(["query", "limit"], "too large"));

        assert_eq!(
            errors.to_details(),
            json!({
                "body": {"data": {"name": "field required", "age": "not an integer"}},
                "query": {"limit": "too large"}
            })
        );
    }

    #[test]
    fn test_merge_later_leaf_wins() {
        let mut errors = ValidationErrors::single(["path", "id"], "first");
        errors.push(ValidationError::new(["path", "id"], "second"));
        assert_eq!(errors.to_details(), json!({"path": {"id": "second"}}));
    }

    #[test]
    fn test_validation_errors_display() {
        let mut errors = ValidationErrors::single(["path", "id"], "bad");
        errors.push(ValidationError::new(["query"], "worse"));
        assert_eq!(errors.to_string(), "path.id: bad; query: worse");
    }

    #[test]
    fn test_endpoint_error_kinds() {
        let missing = EndpointError::from(ParameterError::MissingValue("id".into()));
        assert_eq!(missing.kind(), "MissingValue");
        assert!(missing.validation_errors().is_none());

        let pipeline = EndpointError::from(PipelineError::NotRegistered("x".into()));
        assert_eq!(pipeline.kind(), "PipelineNotRegistered");
        assert_eq!(pipeline.to_string(), "Pipeline 'x' is not registered");
    }

    #[test]
    fn test_cast_failure_is_client_error() {
        let source = ScalarType::Integer.cast(&json!("x")).unwrap_err();
        let err = EndpointError::from(AdapterError::Cast {
            field: "count".into(),
            source,
        });
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors.iter().next().unwrap().loc, loc(&["body", "count"]));
    }
}
