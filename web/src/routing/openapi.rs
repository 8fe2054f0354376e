//! OpenAPI 3.1 document of mounted routes.
//!
//! Built from what routes already declare: path and query parameters from
//! the request describer, the request body model, one response per declared
//! status with its wrapper model, tags, and the passthrough options merged
//! into each operation.

use super::Route;
use crate::request::ParameterSource;
use crate::schema::ModelSchema;
use serde_json::{Map, Value, json};

/// `info` section of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiInfo {
    /// API title.
    pub title: String,
    /// API version.
    pub version: String,
}

impl ApiInfo {
    /// Info with `title` and `version`.
    #[must_use]
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
        }
    }
}

impl Default for ApiInfo {
    fn default() -> Self {
        Self::new("API", env!("CARGO_PKG_VERSION"))
    }
}

/// Document describing `routes`.
///
/// # Example
///
/// ```
/// use cqea_core::Message;
/// use cqea_web::error::AdapterError;
/// use cqea_web::request::{BoundParameter, RequestDescriber, RouteParameter};
/// use cqea_web::response::ResponseDescriber;
/// use cqea_web::routing::{ApiInfo, Endpoint, Route, document};
///
/// let adapter = |_: &[BoundParameter<'_>]| -> Result<Vec<Box<dyn Message>>, AdapterError> { Ok(Vec::new()) };
/// let route = Route::new(
///     "/users/:id",
///     Endpoint::new(
///         RequestDescriber::new(adapter).parameter(RouteParameter::new("id")),
///         ResponseDescriber::new(),
///         "users.get",
///     ),
/// )
/// .method("GET");
///
/// let api = document(&ApiInfo::new("Users", "1.0.0"), [&route]);
/// assert_eq!(api["openapi"], "3.1.0");
/// assert_eq!(api["paths"]["/users/{id}"]["get"]["parameters"][0]["in"], "path");
/// ```
#[must_use]
pub fn document<'a>(info: &ApiInfo, routes: impl IntoIterator<Item = &'a Route>) -> Value {
    let mut paths = Map::new();
    let mut schemas = Map::new();

    for route in routes {
        let operation = operation(route, &mut schemas);
        let item = paths
            .entry(openapi_path(route.path()))
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(item) = item {
            for method in route.methods() {
                item.insert(method.trim().to_ascii_lowercase(), operation.clone());
            }
        }
    }

    json!({
        "openapi": "3.1.0",
        "info": {"title": info.title, "version": info.version},
        "paths": paths,
        "components": {"schemas": schemas},
    })
}

/// `/users/:id/*rest` → `/users/{id}/{rest}`.
fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':').or_else(|| segment.strip_prefix('*')) {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn reference(name: &str) -> Value {
    json!({"$ref": format!("#/components/schemas/{name}")})
}

fn register(schemas: &mut Map<String, Value>, model: &ModelSchema) {
    schemas.insert(model.name().to_string(), model.to_json_schema());
    schemas
        .entry(model.data_type().to_string())
        .or_insert_with(|| json!({"title": model.data_type(), "type": "object"}));
}

fn operation(route: &Route, schemas: &mut Map<String, Value>) -> Value {
    let endpoint = route.endpoint();
    let mut operation = Map::new();
    let mut parameters = Vec::new();

    operation.insert("tags".to_string(), json!(route.tags()));
    operation.insert("operationId".to_string(), json!(endpoint.pipeline_code()));

    for parameter in endpoint.request().parameters() {
        match parameter.source() {
            ParameterSource::Path => parameters.push(json!({
                "name": parameter.name(),
                "in": "path",
                "required": true,
                "schema": {"type": parameter.declared_type()},
            })),
            ParameterSource::Query => {
                let declared = parameter.declared_type();
                schemas
                    .entry(declared.clone())
                    .or_insert_with(|| json!({"title": declared, "type": "object"}));
                parameters.push(json!({
                    "name": parameter.name(),
                    "in": "query",
                    "style": "form",
                    "explode": true,
                    "schema": reference(&declared),
                }));
            }
            ParameterSource::Body => {
                let name = match parameter.schema() {
                    Some(model) => {
                        register(schemas, &model);
                        model.name().to_string()
                    }
                    None => parameter.declared_type(),
                };
                operation.insert(
                    "requestBody".to_string(),
                    json!({
                        "required": true,
                        "content": {"application/json": {"schema": reference(&name)}},
                    }),
                );
            }
            ParameterSource::Request => {}
        }
    }
    if !parameters.is_empty() {
        operation.insert("parameters".to_string(), Value::Array(parameters));
    }

    let mut responses = Map::new();
    for (status, model) in route.responses() {
        let description = status.canonical_reason().unwrap_or("Response");
        let response = match model {
            Some(model) => {
                register(schemas, &model);
                json!({
                    "description": description,
                    "content": {"application/json": {"schema": reference(model.name())}},
                })
            }
            None => json!({"description": description}),
        };
        responses.insert(status.as_u16().to_string(), response);
    }
    if responses.is_empty() {
        responses.insert("204".to_string(), json!({"description": "No Content"}));
    }
    operation.insert("responses".to_string(), Value::Object(responses));

    for (key, value) in route.options() {
        operation.insert(key.clone(), value.clone());
    }
    Value::Object(operation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::interceptors::InterceptorFactory;
    use crate::request::{BoundParameter, ModelParameter, RequestDescriber, RequestParameter, RouteParameter};
    use crate::response::ResponseDescriber;
    use crate::routing::Endpoint;
    use axum::http::StatusCode;
    use cqea_core::{Message, MessageKind, ScalarType};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Deserialize, Serialize)]
    struct User {
        name: String,
    }

    #[derive(Debug)]
    struct UserCreated;

    impl Message for UserCreated {
        fn kind(&self) -> MessageKind {
            MessageKind::Event
        }
    }

    struct Conflict;

    fn no_commands(_: &[BoundParameter<'_>]) -> Result<Vec<Box<dyn Message>>, AdapterError> {
        Ok(Vec::new())
    }

    fn create_route() -> Route {
        let factory = InterceptorFactory::new().map_error::<Conflict>(StatusCode::CONFLICT);
        let endpoint = Endpoint::new(
            RequestDescriber::new(no_commands)
                .parameter(RouteParameter::new("org").cast(ScalarType::Integer))
                .parameter(ModelParameter::<User>::new())
                .parameter(RequestParameter::new()),
            ResponseDescriber::new()
                .interceptor(factory.event::<UserCreated, User>())
                .interceptor(factory.error(StatusCode::CONFLICT).unwrap()),
            "users.create",
        );
        Route::new("/orgs/:org/users", endpoint)
            .method("POST")
            .tag("users")
            .option("summary", "Create a user")
            .option("deprecated", false)
    }

    #[test]
    fn test_openapi_path() {
        assert_eq!(openapi_path("/users/:id/files/*rest"), "/users/{id}/files/{rest}");
        assert_eq!(openapi_path("/health"), "/health");
    }

    #[test]
    fn test_operation_shape() {
        let api = document(&ApiInfo::new("Users", "2.0.0"), [&create_route()]);
        let op = &api["paths"]["/orgs/{org}/users"]["post"];

        assert_eq!(api["info"]["version"], "2.0.0");
        assert_eq!(op["tags"], json!(["users"]));
        assert_eq!(op["summary"], "Create a user");
        assert_eq!(op["deprecated"], false);
        assert_eq!(op["operationId"], "users.create");

        let parameters = op["parameters"].as_array().unwrap();
        assert_eq!(parameters.len(), 1);
        assert_eq!(parameters[0]["schema"]["type"], "integer");

        assert_eq!(
            op["requestBody"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/UserRequest"
        );
        assert_eq!(
            op["responses"]["200"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/UserResponse"
        );
        assert_eq!(
            op["responses"]["409"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/ErrorResponseModel"
        );

        let schemas = api["components"]["schemas"].as_object().unwrap();
        for name in ["User", "UserRequest", "UserResponse", "ErrorResponseModel", "ErrorResponseData"] {
            assert!(schemas.contains_key(name), "missing schema {name}");
        }
    }

    #[test]
    fn test_route_without_interceptors_documents_no_content() {
        let route = Route::new(
            "/ping",
            Endpoint::new(RequestDescriber::new(no_commands), ResponseDescriber::new(), "ping"),
        )
        .method("get")
        .method("head");
        let api = document(&ApiInfo::default(), [&route]);

        assert!(api["paths"]["/ping"]["get"]["responses"]["204"].is_object());
        assert!(api["paths"]["/ping"]["head"].is_object());
        assert!(api["paths"]["/ping"]["get"].get("parameters").is_none());
    }
}
