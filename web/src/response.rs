//! Response side: from a result stream to one HTTP response.
//!
//! # Dispatch
//!
//! ```text
//! MessageStream ──► group_stream ──► Batch ──► first interceptor whose
//!                                              desired type matches ──► Response
//! ```
//!
//! For each batch, interceptors are tried in declaration order; the first
//! one whose desired type is in the batch type's lineage answers. Nothing
//! matching before the stream ends means "no response", which endpoints turn
//! into `204 No Content`.
//!
//! After a match the rest of the stream is either dropped unread
//! ([`DrainPolicy::ShortCircuit`], the default) or consumed and discarded
//! ([`DrainPolicy::DrainRemaining`]) for pipelines that must run to
//! completion.

use crate::error::ResponseError;
use crate::schema::ModelSchema;
use crate::serializing::BatchSerializer;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cqea_core::{Batch, Message, MessageKind, TypeKey, group_stream};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Builds the HTTP response around a serialized body.
pub trait Responder: Send + Sync {
    /// Wrap `body` in a response with `status`.
    fn respond(&self, status: StatusCode, body: Value) -> Response;

    /// Media type announced in the API document.
    fn media_type(&self) -> &'static str {
        "application/json"
    }
}

/// `application/json` responses.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonResponder;

impl Responder for JsonResponder {
    fn respond(&self, status: StatusCode, body: Value) -> Response {
        (status, Json(body)).into_response()
    }
}

/// A rule turning a matching batch into a response.
pub trait ResponseInterceptor: Send + Sync {
    /// What this interceptor catches.
    fn desired_type(&self) -> TypeKey;

    /// Declared status code.
    fn status_code(&self) -> StatusCode;

    /// Declared response model, if any.
    fn response_model(&self) -> Option<&ModelSchema>;

    /// Build the response for `batch`.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError`] when the batch cannot be serialized.
    fn intercept(&self, batch: &Batch) -> Result<Response, ResponseError>;

    /// Whether this interceptor answers `batch`.
    fn matches(&self, batch: &Batch) -> bool {
        batch.matches(&self.desired_type())
    }
}

/// Interceptor for one type key.
///
/// Without a responder/serializer pair it answers with an empty body and
/// its status code (204 unless declared otherwise).
///
/// # Example
///
/// ```
/// use axum::http::StatusCode;
/// use cqea_web::response::{Interceptor, JsonResponder, ResponseInterceptor};
/// use cqea_web::schema::make_response_schema;
/// use cqea_web::serializing::ResponseMapping;
///
/// struct UserCreated;
/// struct User;
///
/// let interceptor = Interceptor::catch::<UserCreated>()
///     .declare(StatusCode::CREATED, make_response_schema::<User>())
///     .respond_with(JsonResponder, ResponseMapping::default());
///
/// assert_eq!(interceptor.status_code(), StatusCode::CREATED);
/// assert_eq!(interceptor.response_model().unwrap().name(), "UserResponse");
/// ```
#[derive(Clone)]
pub struct Interceptor {
    catch: TypeKey,
    status: StatusCode,
    model: Option<ModelSchema>,
    response: Option<(Arc<dyn Responder>, Arc<dyn BatchSerializer>)>,
}

impl Interceptor {
    /// Catch `key` with status 204 and an empty body.
    #[must_use]
    pub fn new(catch: impl Into<TypeKey>) -> Self {
        Self {
            catch: catch.into(),
            status: StatusCode::NO_CONTENT,
            model: None,
            response: None,
        }
    }

    /// Catch messages that are (or specialize) `M`.
    #[must_use]
    pub fn catch<M: ?Sized + 'static>() -> Self {
        Self::new(TypeKey::of::<M>())
    }

    /// Catch every message of `kind`.
    #[must_use]
    pub fn catch_kind(kind: MessageKind) -> Self {
        Self::new(TypeKey::Kind(kind))
    }

    /// Declare the status code only.
    #[must_use]
    pub const fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Declare status code and response model.
    #[must_use]
    pub fn declare(mut self, status: StatusCode, model: ModelSchema) -> Self {
        self.status = status;
        self.model = Some(model);
        self
    }

    /// Serialize matching batches with `serializer` and wrap them with
    /// `responder`.
    #[must_use]
    pub fn respond_with(
        self,
        responder: impl Responder + 'static,
        serializer: impl BatchSerializer + 'static,
    ) -> Self {
        self.respond_with_shared(Arc::new(responder), Arc::new(serializer))
    }

    /// [`respond_with`](Self::respond_with) for shared instances.
    #[must_use]
    pub fn respond_with_shared(
        mut self,
        responder: Arc<dyn Responder>,
        serializer: Arc<dyn BatchSerializer>,
    ) -> Self {
        self.response = Some((responder, serializer));
        self
    }
}

impl ResponseInterceptor for Interceptor {
    fn desired_type(&self) -> TypeKey {
        self.catch
    }

    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn response_model(&self) -> Option<&ModelSchema> {
        self.model.as_ref()
    }

    fn intercept(&self, batch: &Batch) -> Result<Response, ResponseError> {
        match &self.response {
            None => Ok(self.status.into_response()),
            Some((responder, serializer)) => {
                Ok(responder.respond(self.status, serializer.serialize(batch)?))
            }
        }
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("catch", &self.catch)
            .field("status", &self.status)
            .field("model", &self.model.as_ref().map(ModelSchema::name))
            .field("has_body", &self.response.is_some())
            .finish()
    }
}

/// Catches every error message and picks the status per response.
///
/// The status is looked up by walking the first error's lineage (concrete
/// type, declared supertypes nearest first) against the mapping; the first
/// hit wins. Unmapped errors get the default status (500).
#[derive(Clone)]
pub struct ErrorInterceptor {
    mapping: Vec<(TypeKey, StatusCode)>,
    default_status: StatusCode,
    model: ModelSchema,
    responder: Arc<dyn Responder>,
    serializer: Arc<dyn BatchSerializer>,
}

impl ErrorInterceptor {
    /// Error interceptor with an empty mapping.
    #[must_use]
    pub fn new(responder: impl Responder + 'static, serializer: impl BatchSerializer + 'static) -> Self {
        Self {
            mapping: Vec::new(),
            default_status: StatusCode::INTERNAL_SERVER_ERROR,
            model: ModelSchema::error(),
            responder: Arc::new(responder),
            serializer: Arc::new(serializer),
        }
    }

    /// Answer errors that are (or specialize) `key` with `status`.
    #[must_use]
    pub fn map(mut self, key: impl Into<TypeKey>, status: StatusCode) -> Self {
        self.mapping.push((key.into(), status));
        self
    }

    /// [`map`](Self::map) for a type.
    #[must_use]
    pub fn map_type<E: ?Sized + 'static>(self, status: StatusCode) -> Self {
        self.map(TypeKey::of::<E>(), status)
    }

    /// Status for unmapped errors.
    #[must_use]
    pub const fn default_status(mut self, status: StatusCode) -> Self {
        self.default_status = status;
        self
    }

    /// Declare another response model.
    #[must_use]
    pub fn declare(mut self, model: ModelSchema) -> Self {
        self.model = model;
        self
    }

    /// Status for `error`.
    #[must_use]
    pub fn status_for(&self, error: &dyn Message) -> StatusCode {
        error
            .lineage()
            .iter()
            .find_map(|key| {
                self.mapping
                    .iter()
                    .find(|(mapped, _)| mapped == key)
                    .map(|(_, status)| *status)
            })
            .unwrap_or(self.default_status)
    }
}

impl ResponseInterceptor for ErrorInterceptor {
    fn desired_type(&self) -> TypeKey {
        TypeKey::Kind(MessageKind::Error)
    }

    fn status_code(&self) -> StatusCode {
        self.default_status
    }

    fn response_model(&self) -> Option<&ModelSchema> {
        Some(&self.model)
    }

    fn intercept(&self, batch: &Batch) -> Result<Response, ResponseError> {
        let status = batch
            .first()
            .map_or(self.default_status, |error| self.status_for(error));
        Ok(self.responder.respond(status, self.serializer.serialize(batch)?))
    }
}

/// What happens to the unread stream after an interceptor answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Drop the stream without reading further.
    #[default]
    ShortCircuit,
    /// Read and discard the rest before answering.
    DrainRemaining,
}

/// Ordered interceptors of an endpoint.
#[derive(Clone, Default)]
pub struct ResponseDescriber {
    interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    drain: DrainPolicy,
}

impl ResponseDescriber {
    /// Describer without interceptors: every stream yields no response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; earlier ones take precedence.
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Set the drain policy.
    #[must_use]
    pub const fn drain_policy(mut self, policy: DrainPolicy) -> Self {
        self.drain = policy;
        self
    }

    /// Current drain policy.
    #[must_use]
    pub const fn drain(&self) -> DrainPolicy {
        self.drain
    }

    /// Interceptors in precedence order.
    #[must_use]
    pub fn interceptors(&self) -> &[Arc<dyn ResponseInterceptor>] {
        &self.interceptors
    }

    /// `(status, model)` declarations, in precedence order.
    #[must_use]
    pub fn schema(&self) -> Vec<(StatusCode, Option<ModelSchema>)> {
        self.interceptors
            .iter()
            .map(|i| (i.status_code(), i.response_model().cloned()))
            .collect()
    }

    /// First interceptor answering `batch`.
    #[must_use]
    pub fn select(&self, batch: &Batch) -> Option<&dyn ResponseInterceptor> {
        self.interceptors
            .iter()
            .find(|interceptor| interceptor.matches(batch))
            .map(AsRef::as_ref)
    }

    /// Group `stream` and answer with the first matching interceptor.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError`] when the matching interceptor cannot
    /// serialize its batch.
    pub async fn dispatch<S>(&self, stream: S) -> Result<Option<Response>, ResponseError>
    where
        S: Stream<Item = Box<dyn Message>> + Send,
    {
        let mut batches = std::pin::pin!(group_stream(stream));

        while let Some(batch) = batches.next().await {
            let Some(interceptor) = self.select(&batch) else {
                tracing::trace!(
                    message_type = ?batch.message_type(),
                    size = batch.len(),
                    "No interceptor for batch"
                );
                continue;
            };

            let response = interceptor.intercept(&batch)?;

            if self.drain == DrainPolicy::DrainRemaining {
                let mut drained = 0usize;
                while let Some(rest) = batches.next().await {
                    drained += rest.len();
                }
                tracing::debug!(drained, "Drained remaining messages");
            }
            return Ok(Some(response));
        }

        Ok(None)
    }
}

impl fmt::Debug for ResponseDescriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .interceptors
            .iter()
            .map(|i| i.desired_type().to_string())
            .collect();
        f.debug_struct("ResponseDescriber")
            .field("interceptors", &keys)
            .field("drain", &self.drain)
            .finish()
    }
}
