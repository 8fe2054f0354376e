//! Request adapters: bound parameters in, messages out.
//!
//! # Composition
//!
//! [`compose`] folds serialized parameters into field maps:
//!
//! 1. `Fields` outputs are merged in order, last write wins
//! 2. A `FanOut` output is kept aside (the last one wins)
//! 3. With a non-empty fan-out, each element is laid over the merged fields,
//!    the element winning on key clashes: one map per element
//! 4. Otherwise the merged fields form the only map
//!
//! [`DeclarativeAdapter`] then builds one message per map.

use super::{BoundParameter, Serialized};
use crate::error::{AdapterError, ParameterError};
use cqea_core::{Message, ScalarType, short_type_name};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Builds outgoing messages from bound parameters.
///
/// Any `Fn(&[BoundParameter<'_>]) -> Result<Vec<Box<dyn Message>>, AdapterError>`
/// is an adapter.
pub trait RequestAdapter: Send + Sync {
    /// Build the messages for one request.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when a parameter fails to serialize or a
    /// message cannot be built.
    fn adapt(&self, parameters: &[BoundParameter<'_>]) -> Result<Vec<Box<dyn Message>>, AdapterError>;
}

impl<F> RequestAdapter for F
where
    F: Fn(&[BoundParameter<'_>]) -> Result<Vec<Box<dyn Message>>, AdapterError> + Send + Sync,
{
    fn adapt(&self, parameters: &[BoundParameter<'_>]) -> Result<Vec<Box<dyn Message>>, AdapterError> {
        self(parameters)
    }
}

/// Fold serialized parameters into one field map per outgoing message.
///
/// # Errors
///
/// Propagates the first parameter serialization error, including
/// [`ParameterError::MissingValue`] for unbound parameters.
pub fn compose(parameters: &[BoundParameter<'_>]) -> Result<Vec<Map<String, Value>>, ParameterError> {
    let mut scalar = Map::new();
    let mut fan_out: Option<Vec<Map<String, Value>>> = None;

    for parameter in parameters {
        match parameter.serialize()? {
            Serialized::Fields(fields) => scalar.extend(fields),
            Serialized::FanOut(items) => fan_out = Some(items),
        }
    }

    match fan_out {
        Some(items) if !items.is_empty() => Ok(items
            .into_iter()
            .map(|item| {
                let mut fields = scalar.clone();
                fields.extend(item);
                fields
            })
            .collect()),
        _ => Ok(vec![scalar]),
    }
}

/// Builds messages of type `M` by deserializing composed field maps.
///
/// Fields listed in the type-cast map are cast before construction. Fields
/// `M` does not know are ignored unless `M` denies unknown fields, in which
/// case construction fails.
///
/// # Example
///
/// ```
/// use axum::http::Method;
/// use cqea_core::{Message, MessageKind, ScalarType};
/// use cqea_web::request::{BoundParameter, DeclarativeAdapter, RequestAdapter, RouteParameter};
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Debug, Deserialize)]
/// struct Archive {
///     count: i64,
/// }
///
/// impl Message for Archive {
///     fn kind(&self) -> MessageKind { MessageKind::Command }
/// }
///
/// let adapter = DeclarativeAdapter::<Archive>::new().with_cast("count", ScalarType::Integer);
/// let count = RouteParameter::new("count");
/// let bound = [BoundParameter::new(&count, Some(json!("42")))];
///
/// let messages = adapter.adapt(&bound).unwrap();
/// assert_eq!(messages[0].downcast_ref::<Archive>().unwrap().count, 42);
/// ```
pub struct DeclarativeAdapter<M> {
    casts: BTreeMap<String, ScalarType>,
    _message: PhantomData<fn() -> M>,
}

impl<M> DeclarativeAdapter<M>
where
    M: Message + DeserializeOwned,
{
    /// Adapter without type casts.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            casts: BTreeMap::new(),
            _message: PhantomData,
        }
    }

    /// Cast `field` to `scalar` before construction.
    #[must_use]
    pub fn with_cast(mut self, field: impl Into<String>, scalar: ScalarType) -> Self {
        self.casts.insert(field.into(), scalar);
        self
    }

    /// Replace the whole type-cast map.
    #[must_use]
    pub fn with_type_cast_map(mut self, casts: BTreeMap<String, ScalarType>) -> Self {
        self.casts = casts;
        self
    }

    fn type_cast(&self, fields: &mut Map<String, Value>) -> Result<(), AdapterError> {
        for (field, scalar) in &self.casts {
            if let Some(value) = fields.get_mut(field) {
                *value = scalar.cast(value).map_err(|source| AdapterError::Cast {
                    field: field.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn construct(&self, mut fields: Map<String, Value>) -> Result<Box<dyn Message>, AdapterError> {
        self.type_cast(&mut fields)?;
        serde_json::from_value::<M>(Value::Object(fields))
            .map(|message| Box::new(message) as Box<dyn Message>)
            .map_err(|e| AdapterError::Construct {
                message_type: short_type_name(std::any::type_name::<M>()),
                reason: e.to_string(),
            })
    }
}

impl<M> Default for DeclarativeAdapter<M>
where
    M: Message + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> RequestAdapter for DeclarativeAdapter<M>
where
    M: Message + DeserializeOwned,
{
    fn adapt(&self, parameters: &[BoundParameter<'_>]) -> Result<Vec<Box<dyn Message>>, AdapterError> {
        compose(parameters)?
            .into_iter()
            .map(|fields| self.construct(fields))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::request::{Parameter, RouteParameter};
    use cqea_core::MessageKind;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Tag {
        owner: String,
        name: String,
        #[serde(default)]
        count: Option<i64>,
    }

    impl Message for Tag {
        fn kind(&self) -> MessageKind {
            MessageKind::Command
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    /// Parameter whose value is the serialized output itself.
    fn literal(name: &str) -> RouteParameter {
        RouteParameter::new(name).with_serializer(Arc::new(|value: &Value| -> Result<Serialized, ParameterError> {
            Ok(match value {
                Value::Array(items) => Serialized::FanOut(
                    items.iter().filter_map(|item| item.as_object().cloned()).collect(),
                ),
                other => Serialized::Fields(other.as_object().cloned().unwrap_or_default()),
            })
        }))
    }

    fn tags(messages: &[Box<dyn Message>]) -> Vec<&Tag> {
        messages.iter().filter_map(|m| m.downcast_ref::<Tag>()).collect()
    }

    #[test]
    fn test_scalar_parameters_merge_into_one_message() {
        let owner = literal("owner");
        let name = literal("name");
        let bound = [
            BoundParameter::new(&owner, Some(json!({"owner": "ada"}))),
            BoundParameter::new(&name, Some(json!({"name": "red"}))),
        ];

        let messages = DeclarativeAdapter::<Tag>::new().adapt(&bound).unwrap();
        assert_eq!(
            tags(&messages),
            vec![&Tag {
                owner: "ada".into(),
                name: "red".into(),
                count: None
            }]
        );
    }

    #[test]
    fn test_last_scalar_write_wins() {
        let first = literal("first");
        let second = literal("second");
        let bound = [
            BoundParameter::new(&first, Some(json!({"owner": "a", "name": "x"}))),
            BoundParameter::new(&second, Some(json!({"owner": "b"}))),
        ];
        assert_eq!(compose(&bound).unwrap(), vec![fields(json!({"owner": "b", "name": "x"}))]);
    }

    #[test]
    fn test_fan_out_overrides_scalar_keys() {
        let owner = literal("owner");
        let items = literal("items");
        let bound = [
            BoundParameter::new(&owner, Some(json!({"owner": "ada", "name": "default"}))),
            BoundParameter::new(&items, Some(json!([{"name": "red"}, {"name": "blue", "owner": "bob"}]))),
        ];

        let messages = DeclarativeAdapter::<Tag>::new().adapt(&bound).unwrap();
        let tags = tags(&messages);
        assert_eq!(tags.len(), 2);
        assert_eq!((tags[0].owner.as_str(), tags[0].name.as_str()), ("ada", "red"));
        assert_eq!((tags[1].owner.as_str(), tags[1].name.as_str()), ("bob", "blue"));
    }

    #[test]
    fn test_empty_fan_out_falls_back_to_scalar() {
        let owner = literal("owner");
        let items = literal("items");
        let bound = [
            BoundParameter::new(&owner, Some(json!({"owner": "ada"}))),
            BoundParameter::new(&items, Some(json!([]))),
        ];
        assert_eq!(compose(&bound).unwrap(), vec![fields(json!({"owner": "ada"}))]);
    }

    #[test]
    fn test_type_cast_map() {
        let all = literal("all");
        let bound = [BoundParameter::new(
            &all,
            Some(json!({"owner": "ada", "name": "red", "count": "42"})),
        )];

        let adapter = DeclarativeAdapter::<Tag>::new().with_cast("count", ScalarType::Integer);
        let messages = adapter.adapt(&bound).unwrap();
        assert_eq!(tags(&messages)[0].count, Some(42));

        let bad = [BoundParameter::new(
            &all,
            Some(json!({"owner": "ada", "name": "red", "count": "many"})),
        )];
        assert!(matches!(adapter.adapt(&bad), Err(AdapterError::Cast { .. })));
    }

    #[test]
    fn test_unbound_parameter_is_missing_value() {
        let owner = RouteParameter::new("owner");
        let bound = [BoundParameter::new(&owner, None)];
        let err = DeclarativeAdapter::<Tag>::new().adapt(&bound).err().unwrap();
        assert_eq!(
            err,
            AdapterError::Parameter(ParameterError::MissingValue("owner".into()))
        );
    }

    #[test]
    fn test_unknown_field_propagates_construction_error() {
        let all = literal("all");
        let bound = [BoundParameter::new(
            &all,
            Some(json!({"owner": "ada", "name": "red", "colour": "blue"})),
        )];
        let err = DeclarativeAdapter::<Tag>::new().adapt(&bound).err().unwrap();
        assert!(matches!(err, AdapterError::Construct { ref message_type, .. } if message_type == "Tag"));
    }

    #[test]
    fn test_closure_adapter() {
        let adapter = |parameters: &[BoundParameter<'_>]| -> Result<Vec<Box<dyn Message>>, AdapterError> {
            let names: Vec<&str> = parameters.iter().map(BoundParameter::name).collect();
            assert_eq!(names, vec!["owner"]);
            Ok(Vec::new())
        };
        let owner = RouteParameter::new("owner");
        assert_eq!(owner.name(), "owner");
        let bound = [BoundParameter::new(&owner, None)];
        assert!(adapter.adapt(&bound).unwrap().is_empty());
    }
}
