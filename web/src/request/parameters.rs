//! The four parameter kinds.
//!
//! | Kind                 | Reads            | Default serialization                   |
//! |----------------------|------------------|-----------------------------------------|
//! | [`ModelParameter`]   | JSON body        | `data` item → fields, `data` list → fan-out |
//! | [`QueryParameter`]   | query string     | notation clauses → fields               |
//! | [`RouteParameter`]   | path (or query)  | `{name: value}`, optionally cast        |
//! | [`RequestParameter`] | request snapshot | none: fails with `NotImplemented`       |
//!
//! Each kind takes a custom serializer through `with_serializer`.

use super::{Parameter, ParameterSerializer, ParameterSource, RequestContext, Serialized};
use crate::error::{ParameterError, ValidationError, ValidationErrors};
use crate::schema::{ModelSchema, make_request_schema};
use cqea_core::{FilterParam, NotationParser, ScalarType, TypesMap, short_type_name};
use serde::Serialize;
use serde::de::{DeserializeOwned, Deserializer};
use serde_json::{Map, Value};
use serde_path_to_error::Segment;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::Arc;

const FIELD_REQUIRED: &str = "Field required";
const EXTRA_FIELD: &str = "Extra inputs are not permitted";

/// serde reports a missing or unknown field on the enclosing struct: split
/// the field name out of the message so it can join the location.
fn field_failure(message: &str) -> (Option<String>, String) {
    let quoted = |prefix: &str| {
        message
            .strip_prefix(prefix)
            .and_then(|rest| rest.split('`').next())
            .map(str::to_string)
    };
    if let Some(field) = quoted("missing field `") {
        return (Some(field), FIELD_REQUIRED.to_string());
    }
    if let Some(field) = quoted("unknown field `") {
        return (Some(field), EXTRA_FIELD.to_string());
    }
    (None, message.to_string())
}

/// Deserialize through `deserializer`, locating a failure at `loc` followed
/// by the field path serde was on.
fn deserialize_at<'de, D, T>(deserializer: D, loc: &[String]) -> Result<T, ValidationErrors>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    serde_path_to_error::deserialize(deserializer).map_err(|error| {
        let mut loc = loc.to_vec();
        loc.extend(error.path().iter().filter_map(|segment| match segment {
            Segment::Seq { index } => Some(index.to_string()),
            Segment::Map { key } => Some(key.clone()),
            Segment::Enum { variant } => Some(variant.clone()),
            _ => None,
        }));
        let (field, msg) = field_failure(&error.inner().to_string());
        if let Some(field) = field {
            if loc.last() != Some(&field) {
                loc.push(field);
            }
        }
        ValidationErrors::from(ValidationError::new(loc, msg))
    })
}

fn data_loc(index: Option<usize>) -> Vec<String> {
    let mut loc = vec!["body".to_string(), "data".to_string()];
    loc.extend(index.map(|i| i.to_string()));
    loc
}

fn as_fields(name: &str, value: &Value) -> Result<Map<String, Value>, ParameterError> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| ParameterError::Serialize {
            name: name.to_string(),
            reason: format!("expected an object, got {value}"),
        })
}

/// Validated JSON body `{"data": T | [T]}`.
///
/// Serializes a single item into fields and a list into a fan-out. By
/// default only fields present in the request are kept (`exclude_unset`).
pub struct ModelParameter<T> {
    name: String,
    include: Option<BTreeSet<String>>,
    exclude: BTreeSet<String>,
    exclude_none: bool,
    exclude_unset: bool,
    serializer: Option<ParameterSerializer>,
    _model: PhantomData<fn() -> T>,
}

impl<T> ModelParameter<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    /// Parameter named `model`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("model")
    }

    /// Parameter named `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            include: None,
            exclude: BTreeSet::new(),
            exclude_none: false,
            exclude_unset: true,
            serializer: None,
            _model: PhantomData,
        }
    }

    /// Keep only these fields.
    #[must_use]
    pub fn include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Drop these fields.
    #[must_use]
    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Drop fields whose value is `null`.
    #[must_use]
    pub const fn exclude_none(mut self, yes: bool) -> Self {
        self.exclude_none = yes;
        self
    }

    /// Drop fields absent from the request (on by default).
    #[must_use]
    pub const fn exclude_unset(mut self, yes: bool) -> Self {
        self.exclude_unset = yes;
        self
    }

    /// Replace the default serialization.
    #[must_use]
    pub fn with_serializer(mut self, serializer: ParameterSerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    fn dump_item(&self, item: &T, raw: Option<&Value>, index: Option<usize>) -> Result<Value, ValidationErrors> {
        let mut value = serde_json::to_value(item)
            .map_err(|e| ValidationErrors::from(ValidationError::new(data_loc(index), e.to_string())))?;

        if self.exclude_unset {
            if let (Value::Object(fields), Some(Value::Object(given))) = (&mut value, raw) {
                fields.retain(|key, _| given.contains_key(key));
            }
        }
        Ok(value)
    }

    fn dump_fields(&self, mut fields: Map<String, Value>) -> Map<String, Value> {
        fields.retain(|key, value| {
            self.include.as_ref().is_none_or(|include| include.contains(key))
                && !self.exclude.contains(key)
                && !(self.exclude_none && value.is_null())
        });
        fields
    }
}

impl<T> Default for ModelParameter<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Parameter for ModelParameter<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> ParameterSource {
        ParameterSource::Body
    }

    fn declared_type(&self) -> String {
        format!("{}Request", short_type_name(std::any::type_name::<T>()))
    }

    fn schema(&self) -> Option<ModelSchema> {
        Some(make_request_schema::<T>())
    }

    fn extract(&self, ctx: &RequestContext) -> Result<Option<Value>, ValidationErrors> {
        let Some(body) = ctx.json_body()? else {
            return Err(ValidationErrors::single(["body"], FIELD_REQUIRED));
        };
        let Value::Object(mut wrapper) = body else {
            return Err(ValidationErrors::single(["body"], "Input should be an object"));
        };
        let Some(raw) = wrapper.remove("data") else {
            return Err(ValidationErrors::single(["body", "data"], FIELD_REQUIRED));
        };

        let mut errors = ValidationErrors::new();
        for extra in wrapper.keys() {
            errors.push(ValidationError::new(["body", extra.as_str()], EXTRA_FIELD));
        }

        let data = match &raw {
            Value::Array(items) => {
                let mut dumped = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match deserialize_at::<_, T>(item.clone(), &data_loc(Some(i))) {
                        Ok(model) => dumped.push(self.dump_item(&model, Some(item), Some(i))?),
                        Err(e) => errors.append(e),
                    }
                }
                Value::Array(dumped)
            }
            item => match deserialize_at::<_, T>(item.clone(), &data_loc(None)) {
                Ok(model) => self.dump_item(&model, Some(item), None)?,
                Err(e) => {
                    errors.append(e);
                    Value::Null
                }
            },
        };

        if errors.is_empty() {
            Ok(Some(data))
        } else {
            Err(errors)
        }
    }

    fn serialize(&self, value: &Value) -> Result<Serialized, ParameterError> {
        if let Some(serializer) = &self.serializer {
            return serializer(value);
        }

        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| as_fields(&self.name, item).map(|f| self.dump_fields(f)))
                .collect::<Result<Vec<_>, _>>()
                .map(Serialized::FanOut),
            item => as_fields(&self.name, item).map(|f| Serialized::Fields(self.dump_fields(f))),
        }
    }
}

/// A query model: deserialized from the query string, with per-field
/// filter types for the notation parser.
///
/// # Example
///
/// ```
/// use cqea_core::{FilterParam, ScalarType};
/// use cqea_web::request::QueryModel;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize, Serialize)]
/// struct UserFilter {
///     age: Option<String>,
///     order: Option<String>,
/// }
///
/// impl QueryModel for UserFilter {
///     fn filters() -> Vec<FilterParam> {
///         vec![FilterParam::new("age", ScalarType::Integer)]
///     }
/// }
/// ```
pub trait QueryModel: DeserializeOwned + Serialize + Send + Sync + 'static {
    /// Filter metadata of the model's fields.
    fn filters() -> Vec<FilterParam> {
        Vec::new()
    }
}

/// Query string parsed through a notation parser.
pub struct QueryParameter<T> {
    name: String,
    parser: Arc<dyn NotationParser>,
    fields_map: BTreeMap<String, String>,
    types: TypesMap,
    serializer: Option<ParameterSerializer>,
    _model: PhantomData<fn() -> T>,
}

impl<T: QueryModel> QueryParameter<T> {
    /// Query model `T` parsed by `parser`.
    #[must_use]
    pub fn new(name: impl Into<String>, parser: impl NotationParser + 'static) -> Self {
        let types = T::filters()
            .into_iter()
            .map(|filter| (filter.field, filter.filter_type))
            .collect();
        Self {
            name: name.into(),
            parser: Arc::new(parser),
            fields_map: BTreeMap::new(),
            types,
            serializer: None,
            _model: PhantomData,
        }
    }

    /// Rename clause field `from` to message field `to`.
    #[must_use]
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.fields_map.insert(from.into(), to.into());
        self
    }

    /// Replace the default serialization.
    #[must_use]
    pub fn with_serializer(mut self, serializer: ParameterSerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Field → filter type, from `T::filters()`.
    #[must_use]
    pub const fn types_map(&self) -> &TypesMap {
        &self.types
    }
}

impl<T: QueryModel> Parameter for QueryParameter<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> ParameterSource {
        ParameterSource::Query
    }

    fn declared_type(&self) -> String {
        short_type_name(std::any::type_name::<T>())
    }

    fn extract(&self, ctx: &RequestContext) -> Result<Option<Value>, ValidationErrors> {
        let raw = ctx.query().unwrap_or_default();
        let pairs = serde_urlencoded::Deserializer::new(form_urlencoded::parse(raw.as_bytes()));
        let model: T = deserialize_at(pairs, &["query".to_string()])?;
        let value = serde_json::to_value(&model)
            .map_err(|e| ValidationErrors::single(["query"], e.to_string()))?;

        let given: BTreeSet<String> = ctx.query_pairs().into_iter().map(|(key, _)| key).collect();
        let mut fields = match value {
            Value::Object(fields) => fields,
            _ => return Err(ValidationErrors::single(["query"], "query model must be a struct")),
        };
        fields.retain(|key, value| !value.is_null() && given.contains(key));
        Ok(Some(Value::Object(fields)))
    }

    fn serialize(&self, value: &Value) -> Result<Serialized, ParameterError> {
        if let Some(serializer) = &self.serializer {
            return serializer(value);
        }

        let payload = as_fields(&self.name, value)?;
        let clauses = self
            .parser
            .parse(payload, &self.types)
            .map_err(|e| ParameterError::notation(&self.name, &e))?;

        Ok(Serialized::Fields(
            clauses
                .into_iter()
                .map(|(field, clause)| {
                    let field = self.fields_map.get(&field).cloned().unwrap_or(field);
                    (field, clause)
                })
                .collect(),
        ))
    }
}

/// A single path value, falling back to a query value of the same name.
pub struct RouteParameter {
    name: String,
    cast: Option<ScalarType>,
    serializer: Option<ParameterSerializer>,
}

impl RouteParameter {
    /// Uncast string parameter `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cast: None,
            serializer: None,
        }
    }

    /// Cast the value to `scalar` before serializing.
    #[must_use]
    pub const fn cast(mut self, scalar: ScalarType) -> Self {
        self.cast = Some(scalar);
        self
    }

    /// Replace the default serialization.
    #[must_use]
    pub fn with_serializer(mut self, serializer: ParameterSerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }
}

impl Parameter for RouteParameter {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> ParameterSource {
        ParameterSource::Path
    }

    fn declared_type(&self) -> String {
        self.cast.unwrap_or(ScalarType::String).as_str().to_string()
    }

    fn extract(&self, ctx: &RequestContext) -> Result<Option<Value>, ValidationErrors> {
        let value = ctx
            .path_param(&self.name)
            .map(str::to_string)
            .or_else(|| ctx.query_value(&self.name));
        Ok(value.map(Value::String))
    }

    fn serialize(&self, value: &Value) -> Result<Serialized, ParameterError> {
        if let Some(serializer) = &self.serializer {
            return serializer(value);
        }

        let value = match self.cast {
            Some(scalar) => scalar.cast(value).map_err(|e| {
                ParameterError::Invalid(ValidationErrors::single(
                    ["path", self.name.as_str()],
                    e.to_string(),
                ))
            })?,
            None => value.clone(),
        };
        Ok(Serialized::field(self.name.clone(), value))
    }
}

/// The request itself.
///
/// There is no sensible default mapping from a request to message fields,
/// so serializing without a custom serializer fails with
/// [`ParameterError::NotImplemented`].
pub struct RequestParameter {
    name: String,
    serializer: Option<ParameterSerializer>,
}

impl RequestParameter {
    /// Parameter named `request`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("request")
    }

    /// Parameter named `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            serializer: None,
        }
    }

    /// Serializer receiving the request snapshot (see
    /// [`RequestContext::snapshot`]).
    #[must_use]
    pub fn with_serializer(mut self, serializer: ParameterSerializer) -> Self {
        self.serializer = Some(serializer);
        self
    }
}

impl Default for RequestParameter {
    fn default() -> Self {
        Self::new()
    }
}

impl Parameter for RequestParameter {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> ParameterSource {
        ParameterSource::Request
    }

    fn declared_type(&self) -> String {
        "Request".to_string()
    }

    fn extract(&self, ctx: &RequestContext) -> Result<Option<Value>, ValidationErrors> {
        Ok(Some(ctx.snapshot()))
    }

    fn serialize(&self, value: &Value) -> Result<Serialized, ParameterError> {
        match &self.serializer {
            Some(serializer) => serializer(value),
            None => Err(ParameterError::NotImplemented(self.name.clone())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use axum::http::Method;
    use cqea_core::TypedNotation;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize)]
    #[serde(deny_unknown_fields)]
    struct NewUser {
        name: String,
        #[serde(default)]
        nickname: Option<String>,
        #[serde(default)]
        active: bool,
    }

    #[derive(Debug, Deserialize, Serialize)]
    struct UserFilter {
        age: Option<String>,
        name: Option<String>,
        limit: Option<u32>,
    }

    impl QueryModel for UserFilter {
        fn filters() -> Vec<FilterParam> {
            vec![FilterParam::new("age", ScalarType::Integer)]
        }
    }

    fn post(body: &Value) -> RequestContext {
        RequestContext::new(Method::POST, "/users").with_json(body)
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_model_single_item_is_fields() {
        let parameter = ModelParameter::<NewUser>::new();
        let value = parameter
            .extract(&post(&json!({"data": {"name": "ada"}})))
            .unwrap()
            .unwrap();

        // `nickname` and `active` were not sent.
        assert_eq!(
            parameter.serialize(&value).unwrap(),
            Serialized::Fields(fields(json!({"name": "ada"})))
        );
    }

    #[test]
    fn test_model_list_is_fan_out() {
        let parameter = ModelParameter::<NewUser>::new();
        let value = parameter
            .extract(&post(&json!({"data": [{"name": "a"}, {"name": "b", "active": true}]})))
            .unwrap()
            .unwrap();

        assert_eq!(
            parameter.serialize(&value).unwrap(),
            Serialized::FanOut(vec![
                fields(json!({"name": "a"})),
                fields(json!({"name": "b", "active": true})),
            ])
        );
    }

    #[test]
    fn test_model_dump_options() {
        let parameter = ModelParameter::<NewUser>::new()
            .exclude_unset(false)
            .exclude_none(true)
            .exclude(["active"]);
        let value = parameter
            .extract(&post(&json!({"data": {"name": "ada"}})))
            .unwrap()
            .unwrap();

        assert_eq!(
            parameter.serialize(&value).unwrap(),
            Serialized::Fields(fields(json!({"name": "ada"})))
        );

        let only_active = ModelParameter::<NewUser>::new().exclude_unset(false).include(["active"]);
        assert_eq!(
            only_active.serialize(&value).unwrap(),
            Serialized::Fields(fields(json!({"active": false})))
        );
    }

    #[test]
    fn test_model_validation_errors() {
        let parameter = ModelParameter::<NewUser>::new();

        let missing = parameter
            .extract(&RequestContext::new(Method::POST, "/users"))
            .unwrap_err();
        assert_eq!(missing.to_details(), json!({"body": "Field required"}));

        let extra = parameter
            .extract(&post(&json!({"data": {"name": "a", "role": "admin"}})))
            .unwrap_err();
        assert_eq!(
            extra.to_details(),
            json!({"body": {"data": {"role": "Extra inputs are not permitted"}}})
        );
    }

    #[test]
    fn test_model_errors_are_located_by_field() {
        let parameter = ModelParameter::<NewUser>::new();

        let missing = parameter
            .extract(&post(&json!({"data": {"nickname": "a"}})))
            .unwrap_err();
        assert_eq!(
            missing.to_details(),
            json!({"body": {"data": {"name": "Field required"}}})
        );

        let wrong_type = parameter
            .extract(&post(&json!({"data": {"name": "a", "active": "yes"}})))
            .unwrap_err();
        assert_eq!(
            wrong_type.iter().next().unwrap().loc,
            vec!["body", "data", "active"]
        );
    }

    #[test]
    fn test_model_list_errors_are_indexed_and_collected() {
        let parameter = ModelParameter::<NewUser>::new();
        let errors = parameter
            .extract(&post(&json!({"data": [{}, {"name": "b"}, {"name": 3}], "page": 1})))
            .unwrap_err();

        let locs: Vec<_> = errors.iter().map(|e| e.loc.join(".")).collect();
        assert_eq!(locs, ["body.page", "body.data.0.name", "body.data.2.name"]);
    }

    #[test]
    fn test_model_wrapper_requires_data() {
        let parameter = ModelParameter::<NewUser>::new();
        let errors = parameter.extract(&post(&json!({"name": "a"}))).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().loc, vec!["body", "data"]);
    }

    #[test]
    fn test_query_parameter_notation_and_rename() {
        let parameter = QueryParameter::<UserFilter>::new("filter", TypedNotation).rename("name", "username");
        let ctx = RequestContext::new(Method::GET, "/users").with_query("age=30&name=ada");

        let value = parameter.extract(&ctx).unwrap().unwrap();
        assert_eq!(value, json!({"age": "30", "name": "ada"}));

        assert_eq!(
            parameter.serialize(&value).unwrap(),
            Serialized::Fields(fields(json!({"age": 30, "username": "ada"})))
        );
        assert_eq!(parameter.types_map().get("age"), Some(&ScalarType::Integer));
    }

    #[test]
    fn test_query_parameter_errors() {
        let parameter = QueryParameter::<UserFilter>::new("filter", TypedNotation);

        let bad_limit = RequestContext::new(Method::GET, "/users").with_query("name=ada&limit=many");
        let errors = parameter.extract(&bad_limit).unwrap_err();
        assert_eq!(errors.iter().next().unwrap().loc, vec!["query", "limit"]);

        let err = parameter.serialize(&json!({"age": "old"})).unwrap_err();
        let ParameterError::Invalid(errors) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(errors.iter().next().unwrap().loc, vec!["query".to_string(), "age".to_string()]);

        let err = parameter.serialize(&json!({"name": {"eq": "ada"}})).unwrap_err();
        let ParameterError::Invalid(errors) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(errors.iter().next().unwrap().loc, vec!["query", "filter"]);
    }

    #[test]
    fn test_route_parameter_cast() {
        let parameter = RouteParameter::new("count").cast(ScalarType::Integer);
        assert_eq!(
            parameter.serialize(&json!("42")).unwrap(),
            Serialized::field("count", json!(42))
        );

        let err = parameter.serialize(&json!("many")).unwrap_err();
        assert!(matches!(err, ParameterError::Invalid(_)));
    }

    #[test]
    fn test_route_parameter_falls_back_to_query() {
        let parameter = RouteParameter::new("page");
        let ctx = RequestContext::new(Method::GET, "/users").with_query("page=2");
        assert_eq!(parameter.extract(&ctx).unwrap(), Some(json!("2")));

        let none = RequestContext::new(Method::GET, "/users");
        assert_eq!(parameter.extract(&none).unwrap(), None);
    }

    #[test]
    fn test_request_parameter_requires_custom_serializer() {
        let parameter = RequestParameter::new();
        let err = parameter.serialize(&json!({})).unwrap_err();
        assert_eq!(err, ParameterError::NotImplemented("request".into()));

        let custom = RequestParameter::new().with_serializer(Arc::new(|snapshot: &Value| -> Result<Serialized, ParameterError> {
            Ok(Serialized::field("actor", snapshot["headers"]["x-user"].clone()))
        }));
        assert_eq!(
            custom.serialize(&json!({"headers": {"x-user": "ada"}})).unwrap(),
            Serialized::field("actor", json!("ada"))
        );
    }

    #[test]
    fn test_custom_serializer_can_fan_out() {
        let parameter = RouteParameter::new("ids").with_serializer(Arc::new(|value: &Value| -> Result<Serialized, ParameterError> {
            let ids = value.as_str().unwrap_or_default().split(',');
            Ok(Serialized::FanOut(
                ids.map(|id| {
                    let mut fields = Map::new();
                    fields.insert("id".into(), json!(id));
                    fields
                })
                .collect(),
            ))
        }));

        let Serialized::FanOut(items) = parameter.serialize(&json!("a,b")).unwrap() else {
            panic!("expected fan-out");
        };
        assert_eq!(items.len(), 2);
    }
}
