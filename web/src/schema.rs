//! Request/response wrapper models and runtime schema descriptors.
//!
//! Every payload travels wrapped under a `data` field:
//!
//! ```text
//! request:  {"data": {...}}  or  {"data": [{...}, {...}]}
//! response: {"data": {...}}  or  {"data": [...], "meta": {"quantity": 2}}
//! ```
//!
//! The generic wrappers ([`RequestModel`], [`ResponseModel`], ...) are the
//! serde side of that convention. [`ModelSchema`] is the documentation side:
//! a descriptor naming the wrapper (`UserRequest`, `UserResponse`,
//! `UserListResponse`) that interceptors declare and the API document
//! renders. Each `make_*_schema` call mints a new descriptor with its own id,
//! even for a type it has seen before.

use cqea_core::short_type_name;
use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};

/// A single item or a homogeneous list of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// `{"data": {...}}`
    One(T),
    /// `{"data": [...]}`
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Number of items.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    /// Whether this is an empty list.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items as a vector.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

// Branch on the JSON shape so item errors surface instead of a generic
// "did not match any variant" message.
impl<'de, T: DeserializeOwned> Deserialize<'de> for OneOrMany<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    serde_json::from_value(item).map_err(|e| D::Error::custom(format!("[{i}]: {e}")))
                })
                .collect::<Result<Vec<T>, _>>()
                .map(Self::Many),
            value => serde_json::from_value(value)
                .map(Self::One)
                .map_err(D::Error::custom),
        }
    }
}

/// Request body wrapper: `{"data": T | [T]}`, no other field allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, bound(deserialize = "T: DeserializeOwned"))]
pub struct RequestModel<T> {
    /// Payload.
    pub data: OneOrMany<T>,
}

/// Response body wrapper: `{"data": T}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseModel<T> {
    /// Payload.
    pub data: T,
}

/// Payload of the generic error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponseData {
    /// Status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    pub details: Option<Value>,
}

/// `meta` block of a paginated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedListMetaData {
    /// Total number of items matching the query.
    pub quantity: u64,
}

/// `{"data": [T], "meta": {"quantity": n}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedListResponseModel<T> {
    /// Page items.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub meta: PaginatedListMetaData,
}

/// Whether a schema wraps a request or a response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// Request body wrapper.
    Request,
    /// Response body wrapper.
    Response,
}

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime descriptor of a wrapper model.
///
/// Two descriptors are equal only if they come from the same factory call.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    id: u64,
    name: String,
    data_type: String,
    many: bool,
    kind: SchemaKind,
}

impl ModelSchema {
    fn mint(name: String, data_type: String, many: bool, kind: SchemaKind) -> Self {
        Self {
            id: NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed),
            name,
            data_type,
            many,
            kind,
        }
    }

    /// The generic error response model.
    #[must_use]
    pub fn error() -> Self {
        Self::mint(
            "ErrorResponseModel".to_string(),
            "ErrorResponseData".to_string(),
            false,
            SchemaKind::Response,
        )
    }

    /// Process-unique id of this descriptor.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Wrapper name, e.g. `UserResponse`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Short name of the type under `data`.
    #[must_use]
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Whether `data` holds a list.
    #[must_use]
    pub const fn is_many(&self) -> bool {
        self.many
    }

    /// Request or response wrapper.
    #[must_use]
    pub const fn kind(&self) -> SchemaKind {
        self.kind
    }

    /// JSON-schema rendering used by the API document.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let item = json!({ "$ref": format!("#/components/schemas/{}", self.data_type) });
        let data = match (self.kind, self.many) {
            (SchemaKind::Request, _) => json!({ "oneOf": [item, { "type": "array", "items": item }] }),
            (SchemaKind::Response, true) => json!({ "type": "array", "items": item }),
            (SchemaKind::Response, false) => item,
        };
        json!({
            "title": self.name,
            "type": "object",
            "properties": { "data": data },
            "required": ["data"],
        })
    }
}

impl PartialEq for ModelSchema {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ModelSchema {}

/// New `<T>Request` descriptor with `data: T`.
///
/// ```
/// use cqea_web::schema::make_request_schema;
///
/// struct User;
///
/// let first = make_request_schema::<User>();
/// let second = make_request_schema::<User>();
///
/// assert_eq!(first.name(), "UserRequest");
/// assert_eq!(first.data_type(), "User");
/// assert_ne!(first, second);
/// ```
#[must_use]
pub fn make_request_schema<T: ?Sized + 'static>() -> ModelSchema {
    let data_type = short_type_name(std::any::type_name::<T>());
    ModelSchema::mint(format!("{data_type}Request"), data_type, false, SchemaKind::Request)
}

/// New `<T>Response` descriptor with `data: T`.
#[must_use]
pub fn make_response_schema<T: ?Sized + 'static>() -> ModelSchema {
    let data_type = short_type_name(std::any::type_name::<T>());
    ModelSchema::mint(format!("{data_type}Response"), data_type, false, SchemaKind::Response)
}

/// New `<T>ListResponse` descriptor with `data: [T]`.
#[must_use]
pub fn make_response_schema_many<T: ?Sized + 'static>() -> ModelSchema {
    let data_type = short_type_name(std::any::type_name::<T>());
    ModelSchema::mint(format!("{data_type}ListResponse"), data_type, true, SchemaKind::Response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Deserialize, Serialize)]
    #[serde(deny_unknown_fields)]
    struct Item {
        name: String,
    }

    #[test]
    fn test_request_model_single() {
        let model: RequestModel<Item> =
            serde_json::from_value(json!({"data": {"name": "a"}})).unwrap();
        assert_eq!(model.data, OneOrMany::One(Item { name: "a".into() }));
    }

    #[test]
    fn test_request_model_many() {
        let model: RequestModel<Item> =
            serde_json::from_value(json!({"data": [{"name": "a"}, {"name": "b"}]})).unwrap();
        assert_eq!(model.data.len(), 2);
    }

    #[test]
    fn test_request_model_rejects_extra_fields() {
        let result: Result<RequestModel<Item>, _> =
            serde_json::from_value(json!({"data": {"name": "a"}, "other": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_list_item_error_is_indexed() {
        let err = serde_json::from_value::<RequestModel<Item>>(json!({"data": [{"name": "a"}, {}]}))
            .unwrap_err();
        assert!(err.to_string().contains("[1]"));
    }

    #[test]
    fn test_schema_factories_mint_distinct_descriptors() {
        let first = make_response_schema::<Item>();
        let second = make_response_schema::<Item>();

        assert_ne!(first, second);
        assert_ne!(first.id(), second.id());
        assert_eq!(first.name(), "ItemResponse");
        assert_eq!(second.name(), "ItemResponse");
        assert_eq!(first.data_type(), "Item");
        assert_eq!(first.kind(), SchemaKind::Response);
    }

    #[test]
    fn test_list_schema() {
        let schema = make_response_schema_many::<Item>();
        assert_eq!(schema.name(), "ItemListResponse");
        assert!(schema.is_many());
        assert_eq!(
            schema.to_json_schema()["properties"]["data"]["type"],
            json!("array")
        );
    }

    #[test]
    fn test_request_schema_accepts_one_or_many() {
        let schema = make_request_schema::<Item>().to_json_schema();
        let variants = schema["properties"]["data"]["oneOf"].as_array().unwrap();
        assert_eq!(variants[0], json!({"$ref": "#/components/schemas/Item"}));
        assert_eq!(variants[1]["type"], "array");
    }

    #[test]
    fn test_paginated_list_shape() {
        let page = PaginatedListResponseModel {
            data: vec![Item { name: "a".into() }],
            meta: PaginatedListMetaData { quantity: 10 },
        };
        assert_eq!(
            serde_json::to_value(page).unwrap(),
            json!({"data": [{"name": "a"}], "meta": {"quantity": 10}})
        );
    }
}
