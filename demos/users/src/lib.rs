//! User directory service declared with CQEA routes.
//!
//! The service keeps users in memory ([`service::UserDirectory`]) and exposes
//! them through four declarative routes ([`routes`]). Configuration comes
//! from the environment through [`WebConfig`].
//!
//! ```text
//! axum::Router
//!   ├─ CorsLayer / TraceLayer / panic_layer
//!   ├─ AuthLayer (when CQEA_JWT_SECRET is set)
//!   ├─ /users, /users/:id   ──► UserDirectory
//!   └─ /openapi.json
//! ```

pub mod messages;
pub mod routes;
pub mod service;

use axum::extract::Request;
use cqea_web::WebConfig;
use cqea_web::middleware::security::ClaimsRegistrator;
use cqea_web::prelude::*;
use serde_json::{Map, Value};
use service::UserDirectory;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Accept tokens carrying a non-empty `sub` claim.
fn subject_registrator() -> ClaimsRegistrator {
    Arc::new(|_: &mut Request, claims: &Map<String, Value>| {
        claims
            .get("sub")
            .and_then(Value::as_str)
            .is_some_and(|subject| !subject.is_empty())
    })
}

/// Build the application around `directory`.
///
/// # Errors
///
/// Returns an error if the routes cannot be mounted.
pub fn app_with(config: &WebConfig, directory: &UserDirectory) -> anyhow::Result<axum::Router> {
    let state = AppState::new(directory.registry()).with_body_limit(config.body_limit);

    let mut registry = RoutesRegistry::new();
    let mounted = registry.register_namespace(&routes::namespace());
    tracing::info!(routes = mounted, "Routes registered");

    let mut router = Router::new(state);
    if let Some(path) = &config.api_document {
        router = router.with_api_document(path.clone(), ApiInfo::new("Users", env!("CARGO_PKG_VERSION")));
    }
    let mut app = router.mount(&registry)?;

    if let Some(secret) = &config.jwt_secret {
        let authenticator = JwtAuthenticator::new(secret, subject_registrator()).with_algorithm(config.jwt_algorithm);
        app = app.layer(AuthLayer::new(authenticator).public_paths(config.public_paths.clone()));
        tracing::info!(public = ?config.public_paths, "JWT authentication enabled");
    }

    Ok(app
        .layer(panic_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}

/// Build the application around an empty directory.
///
/// # Errors
///
/// Returns an error if the routes cannot be mounted.
pub fn app(config: &WebConfig) -> anyhow::Result<axum::Router> {
    app_with(config, &UserDirectory::default())
}
