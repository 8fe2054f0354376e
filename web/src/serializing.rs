//! Batch serializers.
//!
//! A [`MessageSerializer`] turns one message into JSON. A [`BatchSerializer`]
//! wraps the serialized batch into a response body:
//!
//! | Serializer         | one message          | several messages                 |
//! |--------------------|----------------------|----------------------------------|
//! | [`ResponseMapping`]| `{"data": x}`        | `{"data": [x, y]}`               |
//! | [`ViewMapping`]    | `{"data": x, "meta"}`| `{"data": [x, y], "meta": {..}}` |
//!
//! `meta` is only present when a meta extractor is configured and yields a
//! value for the first view of the batch.

use crate::error::ResponseError;
use cqea_core::{Batch, Message, short_type_name};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Serializes one message.
pub type MessageSerializer = Arc<dyn Fn(&dyn Message) -> Result<Value, ResponseError> + Send + Sync>;

/// Extracts the `meta` block from a view.
pub type MetaExtractor = Arc<dyn Fn(&dyn Message) -> Option<Value> + Send + Sync>;

/// Serializer using [`Message::to_json`].
///
/// Fails with [`ResponseError::NotSerializable`] for messages without a JSON
/// form.
#[must_use]
pub fn json_serializer() -> MessageSerializer {
    Arc::new(|message: &dyn Message| {
        message
            .to_json()
            .ok_or_else(|| ResponseError::NotSerializable(short_type_name(message.type_name())))
    })
}

/// Serializer for one concrete message type.
///
/// # Example
///
/// ```
/// use cqea_core::{Message, MessageKind};
/// use cqea_web::serializing::typed_serializer;
/// use serde_json::json;
///
/// #[derive(Debug)]
/// struct Renamed(String);
///
/// impl Message for Renamed {
///     fn kind(&self) -> MessageKind { MessageKind::Event }
/// }
///
/// let serializer = typed_serializer(|event: &Renamed| json!({"name": event.0}));
/// let value = serializer(&Renamed("ada".into())).unwrap();
/// assert_eq!(value, json!({"name": "ada"}));
/// ```
pub fn typed_serializer<M, F>(f: F) -> MessageSerializer
where
    M: Message,
    F: Fn(&M) -> Value + Send + Sync + 'static,
{
    Arc::new(move |message: &dyn Message| {
        message.downcast_ref::<M>().map(&f).ok_or_else(|| ResponseError::UnexpectedType {
            expected: short_type_name(std::any::type_name::<M>()),
            found: short_type_name(message.type_name()),
        })
    })
}

/// Turns a whole batch into a response body.
pub trait BatchSerializer: Send + Sync {
    /// Serialize `batch`.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError`] when a message cannot be serialized.
    fn serialize(&self, batch: &Batch) -> Result<Value, ResponseError>;
}

fn data_of(serializer: &MessageSerializer, batch: &Batch) -> Result<Value, ResponseError> {
    if batch.len() == 1 {
        return batch.iter().map(|m| serializer(m)).next().unwrap_or(Ok(Value::Null));
    }
    batch
        .iter()
        .map(|m| serializer(m))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// `{"data": x}` for one message, `{"data": [..]}` for several.
#[derive(Clone)]
pub struct ResponseMapping {
    serializer: MessageSerializer,
}

impl ResponseMapping {
    /// Wrap messages serialized by `serializer`.
    #[must_use]
    pub fn new(serializer: MessageSerializer) -> Self {
        Self { serializer }
    }
}

impl Default for ResponseMapping {
    fn default() -> Self {
        Self::new(json_serializer())
    }
}

impl BatchSerializer for ResponseMapping {
    fn serialize(&self, batch: &Batch) -> Result<Value, ResponseError> {
        let mut body = Map::new();
        body.insert("data".to_string(), data_of(&self.serializer, batch)?);
        Ok(Value::Object(body))
    }
}

/// [`ResponseMapping`] plus an optional `meta` block taken from the first view.
#[derive(Clone)]
pub struct ViewMapping {
    serializer: MessageSerializer,
    meta: Option<MetaExtractor>,
}

impl ViewMapping {
    /// Wrap views serialized by `serializer`.
    #[must_use]
    pub fn new(serializer: MessageSerializer) -> Self {
        Self {
            serializer,
            meta: None,
        }
    }

    /// Take `meta` from the first view of each batch.
    #[must_use]
    pub fn with_meta(mut self, extractor: MetaExtractor) -> Self {
        self.meta = Some(extractor);
        self
    }
}

impl Default for ViewMapping {
    fn default() -> Self {
        Self::new(json_serializer())
    }
}

impl BatchSerializer for ViewMapping {
    fn serialize(&self, batch: &Batch) -> Result<Value, ResponseError> {
        let mut body = Map::new();
        body.insert("data".to_string(), data_of(&self.serializer, batch)?);

        let meta = self
            .meta
            .as_ref()
            .zip(batch.first())
            .and_then(|(extract, first)| extract(first));
        if let Some(meta) = meta {
            body.insert("meta".to_string(), meta);
        }
        Ok(Value::Object(body))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cqea_core::MessageKind;
    use serde_json::json;

    #[derive(Debug)]
    struct Row(u32);

    impl Message for Row {
        fn kind(&self) -> MessageKind {
            MessageKind::View
        }

        fn to_json(&self) -> Option<Value> {
            Some(json!({"id": self.0}))
        }
    }

    #[derive(Debug)]
    struct Opaque;

    impl Message for Opaque {
        fn kind(&self) -> MessageKind {
            MessageKind::Event
        }
    }

    fn batch_of(ids: &[u32]) -> Batch {
        let mut batch = Batch::empty();
        for id in ids {
            batch.try_push(Box::new(Row(*id))).unwrap();
        }
        batch
    }

    #[test]
    fn test_single_message_is_not_wrapped_in_list() {
        let body = ResponseMapping::default().serialize(&batch_of(&[1])).unwrap();
        assert_eq!(body, json!({"data": {"id": 1}}));
    }

    #[test]
    fn test_many_messages_keep_order() {
        let body = ResponseMapping::default().serialize(&batch_of(&[3, 1, 2])).unwrap();
        assert_eq!(body, json!({"data": [{"id": 3}, {"id": 1}, {"id": 2}]}));
    }

    #[test]
    fn test_view_mapping_meta_from_first_view() {
        let extractor: MetaExtractor = Arc::new(|view: &dyn Message| {
            view.downcast_ref::<Row>().map(|row| json!({"quantity": row.0 * 10}))
        });
        let mapping = ViewMapping::default().with_meta(extractor);

        let body = mapping.serialize(&batch_of(&[4, 5])).unwrap();
        assert_eq!(
            body,
            json!({"data": [{"id": 4}, {"id": 5}], "meta": {"quantity": 40}})
        );
    }

    #[test]
    fn test_view_mapping_without_meta() {
        let body = ViewMapping::default().serialize(&batch_of(&[1])).unwrap();
        assert_eq!(body, json!({"data": {"id": 1}}));
    }

    #[test]
    fn test_json_serializer_requires_json_form() {
        let err = json_serializer()(&Opaque).unwrap_err();
        assert!(matches!(err, ResponseError::NotSerializable(ref name) if name == "Opaque"));
    }

    #[test]
    fn test_typed_serializer_rejects_other_types() {
        let serializer = typed_serializer(|row: &Row| json!(row.0));
        assert_eq!(serializer(&Row(9)).unwrap(), json!(9));
        assert!(matches!(
            serializer(&Opaque),
            Err(ResponseError::UnexpectedType { .. })
        ));
    }
}
