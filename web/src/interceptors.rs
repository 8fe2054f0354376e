//! Ready-made interceptors for the common response shapes.
//!
//! ```text
//! factory.event::<UserCreated, User>()  → catch UserCreated, 200, UserResponse
//! factory.item_view::<User>()           → catch <view>,      200, UserResponse
//! factory.list_view::<User>()           → catch <view>,      200, UserListResponse
//! factory.error(StatusCode::NOT_FOUND)  → catch mapped type, 404, ErrorResponseModel
//! ```

use crate::error::InterceptorError;
use crate::response::{Interceptor, JsonResponder, Responder};
use crate::schema::{ModelSchema, make_response_schema, make_response_schema_many};
use crate::serializing::{
    MessageSerializer, MetaExtractor, ResponseMapping, ViewMapping, json_serializer,
};
use axum::http::StatusCode;
use cqea_core::{MessageKind, TypeKey};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds interceptors sharing a responder and default serializers.
///
/// Serializers not configured fall back to [`json_serializer`].
///
/// # Example
///
/// ```
/// use axum::http::StatusCode;
/// use cqea_web::interceptors::InterceptorFactory;
/// use cqea_web::response::ResponseInterceptor;
///
/// struct UserNotFound;
///
/// let factory = InterceptorFactory::new().map_error::<UserNotFound>(StatusCode::NOT_FOUND);
///
/// let not_found = factory.error(StatusCode::NOT_FOUND).unwrap();
/// assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
/// assert!(factory.error(StatusCode::CONFLICT).is_err());
/// ```
#[derive(Clone)]
pub struct InterceptorFactory {
    errors: BTreeMap<u16, TypeKey>,
    responder: Arc<dyn Responder>,
    event_serializer: MessageSerializer,
    error_serializer: MessageSerializer,
    view_serializer: MessageSerializer,
    view_meta: Option<MetaExtractor>,
}

impl Default for InterceptorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorFactory {
    /// Factory answering with JSON and serializing via `Message::to_json`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            errors: BTreeMap::new(),
            responder: Arc::new(JsonResponder),
            event_serializer: json_serializer(),
            error_serializer: json_serializer(),
            view_serializer: json_serializer(),
            view_meta: None,
        }
    }

    /// Map `status` to errors that are (or specialize) `key`.
    #[must_use]
    pub fn map_error_key(mut self, status: StatusCode, key: impl Into<TypeKey>) -> Self {
        self.errors.insert(status.as_u16(), key.into());
        self
    }

    /// Map `status` to errors that are (or specialize) `E`.
    #[must_use]
    pub fn map_error<E: ?Sized + 'static>(self, status: StatusCode) -> Self {
        self.map_error_key(status, TypeKey::of::<E>())
    }

    /// Default responder.
    #[must_use]
    pub fn with_responder(mut self, responder: impl Responder + 'static) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    /// Default event serializer.
    #[must_use]
    pub fn with_event_serializer(mut self, serializer: MessageSerializer) -> Self {
        self.event_serializer = serializer;
        self
    }

    /// Default error serializer.
    #[must_use]
    pub fn with_error_serializer(mut self, serializer: MessageSerializer) -> Self {
        self.error_serializer = serializer;
        self
    }

    /// Default view serializer.
    #[must_use]
    pub fn with_view_serializer(mut self, serializer: MessageSerializer) -> Self {
        self.view_serializer = serializer;
        self
    }

    /// Take `meta` from the first view of view batches.
    #[must_use]
    pub fn with_view_meta(mut self, extractor: MetaExtractor) -> Self {
        self.view_meta = Some(extractor);
        self
    }

    /// Interceptor for the error type mapped to `status`.
    ///
    /// # Errors
    ///
    /// Returns [`InterceptorError::UnmappedStatus`] when nothing is mapped
    /// to `status`.
    pub fn error(&self, status: StatusCode) -> Result<Interceptor, InterceptorError> {
        self.error_with(status, self.error_serializer.clone())
    }

    /// [`error`](Self::error) with a specific serializer.
    ///
    /// # Errors
    ///
    /// Returns [`InterceptorError::UnmappedStatus`] when nothing is mapped
    /// to `status`.
    pub fn error_with(
        &self,
        status: StatusCode,
        serializer: MessageSerializer,
    ) -> Result<Interceptor, InterceptorError> {
        let key = self
            .errors
            .get(&status.as_u16())
            .copied()
            .ok_or(InterceptorError::UnmappedStatus(status.as_u16()))?;
        Ok(Interceptor::new(key)
            .declare(status, ModelSchema::error())
            .respond_with_shared(self.responder.clone(), Arc::new(ResponseMapping::new(serializer))))
    }

    /// `200` interceptor for event `E`, documented as `<D>Response`.
    #[must_use]
    pub fn event<E: ?Sized + 'static, D: ?Sized + 'static>(&self) -> Interceptor {
        self.event_with::<E, D>(self.event_serializer.clone())
    }

    /// [`event`](Self::event) with a specific serializer.
    #[must_use]
    pub fn event_with<E: ?Sized + 'static, D: ?Sized + 'static>(
        &self,
        serializer: MessageSerializer,
    ) -> Interceptor {
        Interceptor::catch::<E>()
            .declare(StatusCode::OK, make_response_schema::<D>())
            .respond_with_shared(self.responder.clone(), Arc::new(ResponseMapping::new(serializer)))
    }

    /// `200` interceptor for any view, documented as `<D>Response`.
    #[must_use]
    pub fn item_view<D: ?Sized + 'static>(&self) -> Interceptor {
        self.item_view_with::<D>(self.view_serializer.clone())
    }

    /// [`item_view`](Self::item_view) with a specific serializer.
    #[must_use]
    pub fn item_view_with<D: ?Sized + 'static>(&self, serializer: MessageSerializer) -> Interceptor {
        self.view_interceptor(make_response_schema::<D>(), serializer)
    }

    /// `200` interceptor for any view, documented as `<D>ListResponse`.
    #[must_use]
    pub fn list_view<D: ?Sized + 'static>(&self) -> Interceptor {
        self.list_view_with::<D>(self.view_serializer.clone())
    }

    /// [`list_view`](Self::list_view) with a specific serializer.
    #[must_use]
    pub fn list_view_with<D: ?Sized + 'static>(&self, serializer: MessageSerializer) -> Interceptor {
        self.view_interceptor(make_response_schema_many::<D>(), serializer)
    }

    fn view_interceptor(&self, model: ModelSchema, serializer: MessageSerializer) -> Interceptor {
        let mut mapping = ViewMapping::new(serializer);
        if let Some(meta) = &self.view_meta {
            mapping = mapping.with_meta(meta.clone());
        }
        Interceptor::catch_kind(MessageKind::View)
            .declare(StatusCode::OK, model)
            .respond_with_shared(self.responder.clone(), Arc::new(mapping))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::response::ResponseInterceptor;
    use axum::body::to_bytes;
    use cqea_core::{Batch, Message, MessageType};
    use serde_json::{Value, json};

    struct NotFound;
    struct User;

    #[derive(Debug)]
    struct UserMissing;

    impl Message for UserMissing {
        fn kind(&self) -> MessageKind {
            MessageKind::Error
        }

        fn supertypes(&self) -> Vec<MessageType> {
            vec![MessageType::of::<NotFound>()]
        }

        fn to_json(&self) -> Option<Value> {
            Some(json!({"code": 404, "message": "user missing", "details": null}))
        }
    }

    #[derive(Debug)]
    struct UserRow {
        name: &'static str,
        total: u64,
    }

    impl Message for UserRow {
        fn kind(&self) -> MessageKind {
            MessageKind::View
        }

        fn to_json(&self) -> Option<Value> {
            Some(json!({"name": self.name}))
        }
    }

    async fn render(interceptor: &Interceptor, batch: &Batch) -> (StatusCode, Value) {
        let response = interceptor.intercept(batch).unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_error_interceptor_catches_mapped_supertype() {
        let factory = InterceptorFactory::new().map_error::<NotFound>(StatusCode::NOT_FOUND);
        let interceptor = factory.error(StatusCode::NOT_FOUND).unwrap();

        let batch = Batch::new(Box::new(UserMissing));
        assert!(interceptor.matches(&batch));
        assert_eq!(interceptor.response_model().unwrap().name(), "ErrorResponseModel");

        let (status, body) = render(&interceptor, &batch).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["data"]["message"], "user missing");
    }

    #[test]
    fn test_unmapped_status() {
        let err = InterceptorFactory::new().error(StatusCode::CONFLICT).unwrap_err();
        assert_eq!(err, InterceptorError::UnmappedStatus(409));
    }

    #[test]
    fn test_event_interceptor_declaration() {
        let interceptor = InterceptorFactory::new().event::<UserRow, User>();
        assert_eq!(interceptor.status_code(), StatusCode::OK);
        assert_eq!(interceptor.desired_type(), TypeKey::of::<UserRow>());
        assert_eq!(interceptor.response_model().unwrap().name(), "UserResponse");
    }

    #[tokio::test]
    async fn test_list_view_with_meta() {
        let meta: MetaExtractor = Arc::new(|view: &dyn Message| {
            view.downcast_ref::<UserRow>()
                .map(|row| json!({"quantity": row.total}))
        });
        let factory = InterceptorFactory::new().with_view_meta(meta);
        let interceptor = factory.list_view::<User>();
        assert_eq!(interceptor.desired_type(), TypeKey::Kind(MessageKind::View));
        assert_eq!(interceptor.response_model().unwrap().name(), "UserListResponse");

        let mut batch = Batch::new(Box::new(UserRow { name: "a", total: 9 }));
        batch.try_push(Box::new(UserRow { name: "b", total: 9 })).unwrap();

        let (status, body) = render(&interceptor, &batch).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"data": [{"name": "a"}, {"name": "b"}], "meta": {"quantity": 9}})
        );
    }
}
