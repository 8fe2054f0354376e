//! Messages of the user directory.

use cqea_core::{FilterParam, ScalarType};
use cqea_macros::Message;
use cqea_web::request::QueryModel;
use serde::{Deserialize, Serialize};

/// Supertype of "not found" errors.
pub struct NotFound;

/// Supertype of conflict errors.
pub struct Conflict;

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    /// Assigned id.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Contact address.
    pub email: Option<String>,
}

/// Body of `POST /users`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NewUser {
    /// Unique name.
    pub name: String,
    /// Contact address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Query of `GET /users`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserFilter {
    /// Name prefix.
    pub name: Option<String>,
    /// Maximum number of users.
    pub limit: Option<String>,
}

impl QueryModel for UserFilter {
    fn filters() -> Vec<FilterParam> {
        vec![FilterParam::new("limit", ScalarType::Integer)]
    }
}

/// Create a user.
#[derive(Message, Debug, Clone, Deserialize, Serialize)]
#[message(command, json)]
pub struct CreateUser {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Fetch one user.
#[derive(Message, Debug, Clone, Deserialize)]
#[message(query)]
pub struct GetUser {
    pub id: i64,
}

/// List users whose name starts with `name`, at most `limit` of them.
#[derive(Message, Debug, Clone, Default, Deserialize)]
#[message(query)]
pub struct ListUsers {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Delete a user.
#[derive(Message, Debug, Clone, Deserialize)]
#[message(command)]
pub struct DeleteUser {
    pub id: i64,
}

/// A user was stored.
#[derive(Message, Debug, Clone, Serialize)]
#[message(event, json)]
pub struct UserCreated {
    #[serde(flatten)]
    pub user: User,
}

/// A user was removed.
#[derive(Message, Debug, Clone)]
#[message(event)]
pub struct UserDeleted {
    pub id: i64,
}

/// One user of a query result; `total` counts the whole result.
#[derive(Message, Debug, Clone, Serialize)]
#[message(view, json)]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    #[serde(skip)]
    pub total: u64,
}

/// No user with the requested id.
#[derive(Message, Debug, Clone, Serialize)]
#[message(error, supertypes(NotFound), json)]
pub struct UserNotFound {
    pub code: u16,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl UserNotFound {
    /// Error for user `id`.
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            code: 404,
            message: format!("User {id} not found"),
            details: Some(serde_json::json!({"id": id})),
        }
    }
}

/// The name is taken.
#[derive(Message, Debug, Clone, Serialize)]
#[message(error, supertypes(Conflict), json)]
pub struct UserExists {
    pub code: u16,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl UserExists {
    /// Error for `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            code: 409,
            message: format!("User '{name}' already exists"),
            details: None,
        }
    }
}
