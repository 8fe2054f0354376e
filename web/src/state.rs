//! Shared state of the mounted endpoints.
//!
//! One [`AppState`] is built when the router is mounted and cloned into
//! every handler. It carries what endpoints need besides their own
//! describers: the pipeline registry, the exception handler and the
//! request body limit.

use crate::middleware::{ExceptionHandler, JsonExceptionHandler};
use cqea_core::PipelineRegistry;
use std::fmt;
use std::sync::Arc;

/// Default maximum request body size: 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// State shared across all endpoints of a router.
///
/// # Examples
///
/// ```
/// use cqea_core::PipelineRegistry;
/// use cqea_web::AppState;
///
/// let state = AppState::new(PipelineRegistry::new()).with_body_limit(1024);
/// assert_eq!(state.body_limit(), 1024);
/// assert!(state.pipelines().is_empty());
/// ```
#[derive(Clone)]
pub struct AppState {
    pipelines: Arc<PipelineRegistry>,
    exceptions: Arc<dyn ExceptionHandler>,
    body_limit: usize,
}

impl AppState {
    /// State answering failures with [`JsonExceptionHandler`].
    #[must_use]
    pub fn new(pipelines: PipelineRegistry) -> Self {
        Self {
            pipelines: Arc::new(pipelines),
            exceptions: Arc::new(JsonExceptionHandler),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Replace the exception handler.
    #[must_use]
    pub fn with_exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.exceptions = Arc::new(handler);
        self
    }

    /// Maximum accepted request body size, in bytes.
    #[must_use]
    pub const fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Registered pipelines.
    #[must_use]
    pub fn pipelines(&self) -> &PipelineRegistry {
        &self.pipelines
    }

    /// Exception handler.
    #[must_use]
    pub fn exceptions(&self) -> &dyn ExceptionHandler {
        self.exceptions.as_ref()
    }

    /// Maximum accepted request body size, in bytes.
    #[must_use]
    pub const fn body_limit(&self) -> usize {
        self.body_limit
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("pipelines", &self.pipelines)
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}
