//! Pipeline executor contract and registry.
//!
//! A pipeline accepts the commands built from an HTTP request and answers
//! with an asynchronous stream of result messages (events, errors, views).
//! How it gets there (handlers, buses, stores) is outside this crate.
//!
//! Pipelines are registered under a string code once at startup; endpoints
//! refer to them by code and look them up per request. The registry is never
//! written after the router is built.

use crate::message::Message;
use futures::Stream;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Asynchronous stream of result messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = Box<dyn Message>> + Send>>;

/// Errors raised by pipeline lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No pipeline was registered under the code.
    #[error("Pipeline '{0}' is not registered")]
    NotRegistered(String),
}

/// Executes commands and streams back the resulting messages.
///
/// The returned stream must be finite. Consumers may stop reading before it
/// ends, so implementations must tolerate being dropped early.
///
/// Any `Fn(Vec<Box<dyn Message>>) -> MessageStream` is a pipeline:
///
/// ```
/// use cqea_core::{Message, MessageStream, Pipeline};
/// use futures::{stream, StreamExt};
///
/// let echo = |commands: Vec<Box<dyn Message>>| -> MessageStream {
///     stream::iter(commands).boxed()
/// };
/// let _stream = echo.execute(Vec::new());
/// ```
pub trait Pipeline: Send + Sync {
    /// Run `commands` and stream the results.
    fn execute(&self, commands: Vec<Box<dyn Message>>) -> MessageStream;
}

impl<F> Pipeline for F
where
    F: Fn(Vec<Box<dyn Message>>) -> MessageStream + Send + Sync,
{
    fn execute(&self, commands: Vec<Box<dyn Message>>) -> MessageStream {
        self(commands)
    }
}

/// Pipelines addressed by code.
///
/// # Example
///
/// ```
/// use cqea_core::{Message, MessageStream, PipelineRegistry};
/// use futures::{stream, StreamExt};
///
/// let registry = PipelineRegistry::new().with_pipeline("users.create", |_: Vec<Box<dyn Message>>| -> MessageStream {
///     stream::empty().boxed()
/// });
///
/// assert!(registry.contains("users.create"));
/// assert!(registry.get("users.delete").is_err());
/// ```
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    pipelines: HashMap<String, Arc<dyn Pipeline>>,
}

impl PipelineRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pipeline` under `code`, replacing any previous entry.
    pub fn register(&mut self, code: impl Into<String>, pipeline: impl Pipeline + 'static) {
        self.pipelines.insert(code.into(), Arc::new(pipeline));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_pipeline(mut self, code: impl Into<String>, pipeline: impl Pipeline + 'static) -> Self {
        self.register(code, pipeline);
        self
    }

    /// Whether a pipeline is registered under `code`.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.pipelines.contains_key(code)
    }

    /// Look up the pipeline registered under `code`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotRegistered`] for unknown codes.
    pub fn get(&self, code: &str) -> Result<Arc<dyn Pipeline>, PipelineError> {
        self.pipelines
            .get(code)
            .cloned()
            .ok_or_else(|| PipelineError::NotRegistered(code.to_string()))
    }

    /// Registered codes, sorted.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.pipelines.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// Number of registered pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether no pipeline is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("codes", &self.codes())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use futures::{stream, StreamExt};

    #[derive(Debug)]
    struct Echoed;

    impl Message for Echoed {
        fn kind(&self) -> MessageKind {
            MessageKind::Event
        }
    }

    fn echo(commands: Vec<Box<dyn Message>>) -> MessageStream {
        stream::iter(commands).boxed()
    }

    #[tokio::test]
    async fn test_function_is_pipeline() {
        let registry = PipelineRegistry::new().with_pipeline("echo", echo);
        let pipeline = registry.get("echo").unwrap();

        let out: Vec<_> = pipeline.execute(vec![Box::new(Echoed)]).collect().await;
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_unknown_code() {
        let registry = PipelineRegistry::new();
        let err = registry.get("missing").err().unwrap();
        assert_eq!(err.to_string(), "Pipeline 'missing' is not registered");
    }

    #[test]
    fn test_codes_sorted() {
        let registry = PipelineRegistry::new()
            .with_pipeline("b", echo)
            .with_pipeline("a", echo);
        assert_eq!(registry.codes(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
    }
}
