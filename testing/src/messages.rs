//! Sample messages of a small user domain.
//!
//! ```text
//! CreateUser (command) ──► UserCreated (event)
//! GetUser    (query)   ──► UserView    (view) | UserNotFound (error: NotFound)
//!                          UserExists  (error: Conflict)
//! ```

use cqea_macros::Message;
use serde::{Deserialize, Serialize};

/// Marker supertype of "not found" errors.
#[derive(Debug)]
pub struct NotFound;

/// Marker supertype of conflict errors.
#[derive(Debug)]
pub struct Conflict;

/// Create a user.
#[derive(Message, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[message(command, json)]
pub struct CreateUser {
    /// Owning organisation.
    #[serde(default)]
    pub org: Option<i64>,
    /// User name.
    pub name: String,
    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,
}

/// Fetch a user.
#[derive(Message, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[message(query, json)]
pub struct GetUser {
    /// User id.
    pub id: i64,
}

/// A user was created.
#[derive(Message, Debug, Clone, PartialEq, Eq, Serialize)]
#[message(event, json)]
pub struct UserCreated {
    /// Assigned id.
    pub id: i64,
    /// User name.
    pub name: String,
}

impl UserCreated {
    /// Event for `name` with `id`.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// A user was renamed.
#[derive(Message, Debug, Clone, PartialEq, Eq, Serialize)]
#[message(event, json)]
pub struct UserRenamed {
    /// User id.
    pub id: i64,
    /// New name.
    pub name: String,
}

/// Read model of a user.
#[derive(Message, Debug, Clone, PartialEq, Eq, Serialize)]
#[message(view, json)]
pub struct UserView {
    /// User id.
    pub id: i64,
    /// User name.
    pub name: String,
    /// Total matching users, for list responses.
    #[serde(skip)]
    pub total: u64,
}

/// No user with the requested id.
#[derive(Message, Debug, Clone, PartialEq, Eq, Serialize)]
#[message(error, supertypes(NotFound), json)]
pub struct UserNotFound {
    /// Always 404.
    pub code: u16,
    /// Human readable message.
    pub message: String,
    /// Extra data.
    pub details: Option<serde_json::Value>,
}

impl UserNotFound {
    /// Error for user `id`.
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self {
            code: 404,
            message: format!("user {id} not found"),
            details: None,
        }
    }
}

/// A user with that name already exists.
#[derive(Message, Debug, Clone, PartialEq, Eq, Serialize)]
#[message(error, supertypes(Conflict), json)]
pub struct UserExists {
    /// Always 409.
    pub code: u16,
    /// Human readable message.
    pub message: String,
    /// Extra data.
    pub details: Option<serde_json::Value>,
}

impl UserExists {
    /// Error for `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            code: 409,
            message: format!("user {name} already exists"),
            details: None,
        }
    }
}
