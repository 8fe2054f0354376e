//! # CQEA Core
//!
//! Message-facing building blocks for adapting CQEA (command, query, event,
//! answer) pipelines to HTTP.
//!
//! This crate does not define what a command or an event *means*. It only
//! provides the surface the web layer needs to pattern-match against
//! messages produced elsewhere:
//!
//! - **Message**: an opaque value with a runtime type, a [`MessageKind`] and
//!   an optional lineage of supertypes
//! - **Batch**: a maximal run of consecutive messages of one concrete type
//! - **Grouping**: turning a message stream into a stream of batches
//! - **Pipeline**: the external executor contract (commands in, stream out)
//! - **Casting / notation**: typed coercion of flat request payloads
//!
//! ## Data Flow
//!
//! ```text
//! commands ──► Pipeline ──► MessageStream ──► group_stream ──► Batch, Batch, ...
//! ```
//!
//! ## Example
//!
//! ```
//! use cqea_core::{group_stream, Message, MessageKind};
//! use futures::{stream, StreamExt};
//!
//! #[derive(Debug)]
//! struct Created(u32);
//!
//! impl Message for Created {
//!     fn kind(&self) -> MessageKind {
//!         MessageKind::Event
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let messages: Vec<Box<dyn Message>> = vec![Box::new(Created(1)), Box::new(Created(2))];
//! let batches: Vec<_> = group_stream(stream::iter(messages)).collect().await;
//! assert_eq!(batches.len(), 1);
//! assert_eq!(batches[0].len(), 2);
//! # });
//! ```

pub mod batch;
pub mod cast;
pub mod grouping;
pub mod message;
pub mod notation;
pub mod pipeline;

// Re-export commonly used types
pub use batch::Batch;
pub use cast::{CastError, ScalarType};
pub use grouping::group_stream;
pub use message::{Message, MessageKind, MessageType, TypeKey, json_of, short_type_name};
pub use notation::{FilterParam, FilterType, NotationError, NotationParser, TypedNotation, TypesMap};
pub use pipeline::{MessageStream, Pipeline, PipelineError, PipelineRegistry};

// Used by `#[derive(Message)]` expansions.
pub use serde_json;
