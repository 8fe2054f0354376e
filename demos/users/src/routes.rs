//! Route factories of the user directory.
//!
//! ```text
//! POST   /users      NewUser body      → CreateUser → 201 User | 409
//! GET    /users      name, limit query → ListUsers  → 200 [User] + meta
//! GET    /users/:id  id path           → GetUser    → 200 User | 404
//! DELETE /users/:id  id path           → DeleteUser → 204 | 404
//! ```

use crate::messages::{
    Conflict, CreateUser, DeleteUser, GetUser, ListUsers, NewUser, NotFound, User, UserCreated,
    UserDeleted, UserFilter, UserView,
};
use cqea_core::{Message, ScalarType, TypedNotation};
use cqea_web::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn interceptors() -> InterceptorFactory {
    InterceptorFactory::new()
        .map_error::<NotFound>(StatusCode::NOT_FOUND)
        .map_error::<Conflict>(StatusCode::CONFLICT)
        .with_view_meta(Arc::new(|view: &dyn Message| {
            view.downcast_ref::<UserView>()
                .map(|view| json!({"quantity": view.total}))
        }))
}

fn user_id() -> RouteParameter {
    RouteParameter::new("id").cast(ScalarType::Integer)
}

/// `POST /users`
///
/// # Errors
///
/// Fails if the conflict interceptor cannot be built.
pub fn create_user() -> anyhow::Result<Route> {
    let request = RequestDescriber::new(DeclarativeAdapter::<CreateUser>::new())
        .parameter(ModelParameter::<NewUser>::new());
    let response = ResponseDescriber::new()
        .interceptor(
            Interceptor::catch::<UserCreated>()
                .declare(StatusCode::CREATED, make_response_schema::<User>())
                .respond_with(JsonResponder, ResponseMapping::default()),
        )
        .interceptor(interceptors().error(StatusCode::CONFLICT)?);

    Ok(Route::new("/users", Endpoint::new(request, response, "users.create"))
        .method("POST")
        .tag("users")
        .option("summary", "Create a user"))
}

/// `GET /users`
///
/// # Errors
///
/// Never fails; returns a `Result` like every route factory.
pub fn list_users() -> anyhow::Result<Route> {
    let request = RequestDescriber::new(DeclarativeAdapter::<ListUsers>::new())
        .parameter(QueryParameter::<UserFilter>::new("filter", TypedNotation));
    let response = ResponseDescriber::new().interceptor(interceptors().list_view::<User>());

    Ok(Route::new("/users", Endpoint::new(request, response, "users.list"))
        .method("GET")
        .tag("users"))
}

/// `GET /users/:id`
///
/// # Errors
///
/// Never fails; returns a `Result` like every route factory.
pub fn get_user() -> anyhow::Result<Route> {
    let request = RequestDescriber::new(DeclarativeAdapter::<GetUser>::new()).parameter(user_id());
    let response = ResponseDescriber::new()
        .interceptor(interceptors().item_view::<User>())
        .interceptor(
            ErrorInterceptor::new(JsonResponder, ResponseMapping::default())
                .map_type::<NotFound>(StatusCode::NOT_FOUND),
        );

    Ok(Route::new("/users/:id", Endpoint::new(request, response, "users.get"))
        .method("GET")
        .tag("users"))
}

/// `DELETE /users/:id`
///
/// # Errors
///
/// Fails if the not-found interceptor cannot be built.
pub fn delete_user() -> anyhow::Result<Route> {
    let request = RequestDescriber::new(DeclarativeAdapter::<DeleteUser>::new()).parameter(user_id());
    let response = ResponseDescriber::new()
        .interceptor(Interceptor::catch::<UserDeleted>())
        .interceptor(interceptors().error(StatusCode::NOT_FOUND)?);

    Ok(Route::new("/users/:id", Endpoint::new(request, response, "users.delete"))
        .method("DELETE")
        .tag("users"))
}

/// Every route of the service, under a `users` namespace.
#[must_use]
pub fn namespace() -> RouteNamespace {
    RouteNamespace::new("api").child(
        RouteNamespace::new("users")
            .factory("create_user", create_user)
            .factory("list_users", list_users)
            .factory("get_user", get_user)
            .factory("delete_user", delete_user),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_builds_every_route() {
        let mut registry = RoutesRegistry::new();
        assert_eq!(registry.register_namespace(&namespace()), 4);

        let paths: Vec<(&str, &str)> = registry
            .iter()
            .map(|route| (route.methods()[0].as_str(), route.path()))
            .collect();
        assert!(paths.contains(&("DELETE", "/users/:id")));
    }

    #[test]
    fn test_create_user_documents_created_and_conflict() {
        let responses = create_user().unwrap().responses();
        assert_eq!(
            responses[&StatusCode::CREATED].as_ref().map(|m| m.name().to_string()),
            Some("UserResponse".to_string())
        );
        assert!(responses.contains_key(&StatusCode::CONFLICT));
    }
}
