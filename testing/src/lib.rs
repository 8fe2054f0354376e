//! # CQEA Testing
//!
//! Testing utilities for CQEA web adapters.
//!
//! This crate provides:
//! - Sample messages of a small user domain ([`messages`])
//! - Scripted pipelines and stream probes ([`pipelines`])
//! - Response assertion helpers ([`helpers`])
//! - proptest strategies over message sequences ([`properties`])
//!
//! ## Example
//!
//! ```ignore
//! use cqea_testing::{ScriptedPipeline, boxed, messages::UserCreated};
//!
//! #[tokio::test]
//! async fn test_create_user() {
//!     let pipeline = ScriptedPipeline::answering(|| vec![boxed(UserCreated::new(1, "ada"))]);
//!     let pipelines = PipelineRegistry::new().with_pipeline("users.create", pipeline.clone());
//!     // mount routes, send a request ...
//!     assert_eq!(pipeline.calls(), 1);
//! }
//! ```

pub mod messages;
pub mod pipelines;

/// Response assertion helpers.
pub mod helpers {
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::Response;
    use serde_json::Value;

    /// Status and JSON body of `response`; an empty body reads as `null`.
    ///
    /// # Panics
    ///
    /// Panics if the body cannot be read or is not JSON.
    #[allow(clippy::unwrap_used)]
    pub async fn response_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        if bytes.is_empty() {
            return (status, Value::Null);
        }
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Install a `tracing` subscriber honoring `RUST_LOG`, once per process.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use crate::messages::{UserCreated, UserRenamed, UserView};
    use crate::pipelines::boxed;
    use cqea_core::Message;
    use proptest::prelude::*;

    /// One of three sample message types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Sample {
        /// [`UserCreated`]
        Created,
        /// [`UserRenamed`]
        Renamed,
        /// [`UserView`]
        View,
    }

    impl Sample {
        /// Message of this type carrying `id`.
        #[must_use]
        pub fn message(self, id: i64) -> Box<dyn Message> {
            match self {
                Self::Created => boxed(UserCreated::new(id, "created")),
                Self::Renamed => boxed(UserRenamed {
                    id,
                    name: "renamed".to_string(),
                }),
                Self::View => boxed(UserView {
                    id,
                    name: "view".to_string(),
                    total: 0,
                }),
            }
        }
    }

    /// Any sample type.
    pub fn sample() -> impl Strategy<Value = Sample> {
        prop_oneof![Just(Sample::Created), Just(Sample::Renamed), Just(Sample::View)]
    }

    /// Sequences of up to `max_len` sample types.
    pub fn sample_sequence(max_len: usize) -> impl Strategy<Value = Vec<Sample>> {
        proptest::collection::vec(sample(), 0..=max_len)
    }

    /// Messages for `samples`, ids numbering their positions.
    #[must_use]
    pub fn materialize(samples: &[Sample]) -> Vec<Box<dyn Message>> {
        samples
            .iter()
            .zip(0_i64..)
            .map(|(sample, id)| sample.message(id))
            .collect()
    }
}

// Re-export commonly used items
pub use pipelines::{CountingStream, ScriptedPipeline, boxed, counted, trickle};

#[cfg(test)]
mod tests {
    use super::properties::{Sample, materialize};

    #[test]
    fn test_materialize_numbers_messages() {
        let messages = materialize(&[Sample::Created, Sample::View]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].to_json().and_then(|v| v["id"].as_i64()), Some(1));
    }
}
