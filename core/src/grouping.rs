//! Grouping a message stream into homogeneous batches.
//!
//! # Algorithm
//!
//! One batch is open at a time:
//!
//! 1. No batch open → open one with the incoming message
//! 2. Same exact type as the open batch → append
//! 3. Different type → emit the open batch, open a new one
//! 4. End of stream → emit the open batch, if any
//!
//! Type equality is exact (`TypeId`), never "is-a": a batch of `UserCreated`
//! is closed by a following `AdminCreated` even when both share a
//! supertype. Arrival order is preserved and nothing is buffered beyond the
//! open batch.

use crate::batch::Batch;
use crate::message::Message;
use futures::{Stream, StreamExt};

/// Turn a message stream into a stream of maximal same-type batches.
///
/// Batches are yielded lazily: a batch is only emitted once the next
/// message (or the end of the stream) proves it complete. Dropping the
/// returned stream drops the source without draining it.
///
/// # Example
///
/// ```
/// use cqea_core::{group_stream, Message, MessageKind};
/// use futures::{stream, StreamExt};
///
/// #[derive(Debug)]
/// struct A;
/// #[derive(Debug)]
/// struct B;
///
/// impl Message for A {
///     fn kind(&self) -> MessageKind { MessageKind::Event }
/// }
/// impl Message for B {
///     fn kind(&self) -> MessageKind { MessageKind::Event }
/// }
///
/// # tokio_test::block_on(async {
/// let messages: Vec<Box<dyn Message>> =
///     vec![Box::new(A), Box::new(A), Box::new(B), Box::new(A)];
/// let sizes: Vec<usize> = group_stream(stream::iter(messages))
///     .map(|batch| batch.len())
///     .collect()
///     .await;
/// assert_eq!(sizes, vec![2, 1, 1]);
/// # });
/// ```
pub fn group_stream<S>(source: S) -> impl Stream<Item = Batch> + Send
where
    S: Stream<Item = Box<dyn Message>> + Send,
{
    async_stream::stream! {
        let mut source = std::pin::pin!(source);
        let mut open: Option<Batch> = None;

        while let Some(message) = source.next().await {
            let rejected = match open.as_mut() {
                Some(batch) => batch.try_push(message).err(),
                None => Some(message),
            };

            if let Some(message) = rejected {
                if let Some(done) = open.replace(Batch::new(message)) {
                    yield done;
                }
            }
        }

        if let Some(batch) = open {
            if !batch.is_empty() {
                yield batch;
            }
        }
    }
}
