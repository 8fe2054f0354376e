//! Exception handling and request guards.
//!
//! - [`ExceptionHandler`]: turns an [`EndpointError`] into a response;
//!   [`JsonExceptionHandler`] renders the standard error envelope
//! - [`panic_layer`]: catches handler panics and answers with a 500 envelope
//! - [`security`]: JWT and gateway authentication layers
//!
//! # Example
//!
//! ```ignore
//! use cqea_web::middleware::{panic_layer, security::{AuthLayer, JwtAuthenticator}};
//!
//! let app = router
//!     .layer(AuthLayer::new(JwtAuthenticator::new(secret, registrator)).public_paths(["/docs"]))
//!     .layer(panic_layer());
//! ```

pub mod security;

use crate::error::{AppError, EndpointError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;

/// Maps endpoint failures to responses.
pub trait ExceptionHandler: Send + Sync {
    /// Response for `error`.
    fn handle(&self, error: &EndpointError) -> Response;
}

/// Renders every failure as the `{code, message, details}` envelope.
///
/// | Failure                      | Status | `details`                         |
/// |------------------------------|--------|-----------------------------------|
/// | validation (body, path, ...) | 422    | messages nested by location       |
/// | body over the size limit     | 413    | `{"limit": <bytes>}`              |
/// | anything else                | 500    | `{"type": <failure kind>}`        |
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExceptionHandler;

impl ExceptionHandler for JsonExceptionHandler {
    fn handle(&self, error: &EndpointError) -> Response {
        if let Some(errors) = error.validation_errors() {
            tracing::debug!(error = %errors, "Request validation failed");
            return AppError::validation(&errors).into_response();
        }
        if let EndpointError::PayloadTooLarge { limit } = error {
            return AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
                .with_details(json!({"limit": limit}))
                .into_response();
        }

        AppError::internal(error.to_string(), error.kind()).into_response()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| (*s).to_string()))
        .unwrap_or_else(|| "handler panicked".to_string())
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    AppError::internal(panic_message(&*payload), "Panic").into_response()
}

/// Layer answering handler panics with the 500 envelope.
#[must_use]
pub fn panic_layer() -> CatchPanicLayer<fn(Box<dyn Any + Send + 'static>) -> Response> {
    CatchPanicLayer::custom(panic_response as fn(Box<dyn Any + Send + 'static>) -> Response)
}
