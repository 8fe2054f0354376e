//! Pipelines and stream probes for endpoint tests.
//!
//! - [`ScriptedPipeline`]: answers every call with messages produced by a
//!   script from the received commands, and records what it received
//! - [`CountingStream`]: wraps a message stream and counts how many messages
//!   the consumer actually pulled

use cqea_core::{Message, MessageStream, Pipeline};
use futures::{Stream, StreamExt, stream};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

type Script = dyn Fn(&[Box<dyn Message>]) -> Vec<Box<dyn Message>> + Send + Sync;

/// Pipeline answering with a script and recording its calls.
///
/// Clones share the recording and the pull counter.
///
/// # Example
///
/// ```
/// use cqea_core::{Message, Pipeline};
/// use cqea_testing::messages::UserCreated;
/// use cqea_testing::pipelines::ScriptedPipeline;
/// use futures::StreamExt;
///
/// let pipeline = ScriptedPipeline::new(|commands| {
///     commands.iter().map(|_| Box::new(UserCreated::new(1, "ada")) as Box<dyn Message>).collect()
/// });
///
/// # tokio_test::block_on(async {
/// let results: Vec<_> = pipeline.execute(Vec::new()).collect().await;
/// assert!(results.is_empty());
/// assert_eq!(pipeline.calls(), 1);
/// # });
/// ```
#[derive(Clone)]
pub struct ScriptedPipeline {
    script: Arc<Script>,
    received: Arc<Mutex<Vec<Vec<Box<dyn Message>>>>>,
    pulled: Arc<AtomicUsize>,
}

impl ScriptedPipeline {
    /// Pipeline answering with `script(commands)`.
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&[Box<dyn Message>]) -> Vec<Box<dyn Message>> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            received: Arc::new(Mutex::new(Vec::new())),
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pipeline answering every call with `results()`.
    pub fn answering<F>(results: F) -> Self
    where
        F: Fn() -> Vec<Box<dyn Message>> + Send + Sync + 'static,
    {
        Self::new(move |_| results())
    }

    /// Pipeline producing no messages.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Number of `execute` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.received.lock().map_or(0, |received| received.len())
    }

    /// Messages pulled from all result streams so far.
    #[must_use]
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    /// Run `f` over the commands received by each call, in call order.
    pub fn inspect<R>(&self, f: impl FnOnce(&[Vec<Box<dyn Message>>]) -> R) -> Option<R> {
        self.received.lock().ok().map(|received| f(&received))
    }

    /// JSON of every received command, flattened across calls.
    #[must_use]
    pub fn received_json(&self) -> Vec<serde_json::Value> {
        self.inspect(|calls| {
            calls
                .iter()
                .flatten()
                .map(|command| command.to_json().unwrap_or(serde_json::Value::Null))
                .collect()
        })
        .unwrap_or_default()
    }
}

impl Pipeline for ScriptedPipeline {
    fn execute(&self, commands: Vec<Box<dyn Message>>) -> MessageStream {
        let results = (self.script)(&commands);
        if let Ok(mut received) = self.received.lock() {
            received.push(commands);
        }
        CountingStream::new(stream::iter(results), self.pulled.clone()).boxed()
    }
}

/// Stream wrapper counting pulled items.
pub struct CountingStream<S> {
    inner: S,
    pulled: Arc<AtomicUsize>,
}

impl<S> CountingStream<S> {
    /// Count items pulled from `inner` into `pulled`.
    pub const fn new(inner: S, pulled: Arc<AtomicUsize>) -> Self {
        Self { inner, pulled }
    }
}

impl<S> Stream for CountingStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.inner.poll_next_unpin(cx);
        if let Poll::Ready(Some(_)) = &poll {
            self.pulled.fetch_add(1, Ordering::SeqCst);
        }
        poll
    }
}

/// Box a message.
pub fn boxed<M: Message>(message: M) -> Box<dyn Message> {
    Box::new(message)
}

/// Stream over `messages` whose pulls are counted into the returned counter.
pub fn counted(messages: Vec<Box<dyn Message>>) -> (MessageStream, Arc<AtomicUsize>) {
    let pulled = Arc::new(AtomicUsize::new(0));
    let stream = CountingStream::new(stream::iter(messages), pulled.clone()).boxed();
    (stream, pulled)
}

/// Stream yielding `messages` one by one, each after a scheduler yield.
pub fn trickle(messages: Vec<Box<dyn Message>>) -> MessageStream {
    async_stream::stream! {
        for message in messages {
            tokio::task::yield_now().await;
            yield message;
        }
    }
    .boxed()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::messages::{CreateUser, UserCreated};

    #[tokio::test]
    async fn test_scripted_pipeline_records_commands() {
        let pipeline = ScriptedPipeline::new(|commands| {
            commands
                .iter()
                .filter_map(|c| c.downcast_ref::<CreateUser>())
                .map(|c| boxed(UserCreated::new(1, c.name.clone())))
                .collect()
        });

        let command = CreateUser {
            org: None,
            name: "ada".into(),
            email: None,
        };
        let results: Vec<_> = pipeline.execute(vec![boxed(command)]).collect().await;

        assert_eq!(results.len(), 1);
        assert_eq!(pipeline.calls(), 1);
        assert_eq!(pipeline.pulled(), 1);
        assert_eq!(pipeline.received_json()[0]["name"], "ada");
    }

    #[tokio::test]
    async fn test_counting_stream_counts_only_pulled_items() {
        let (mut stream, pulled) = counted(vec![
            boxed(UserCreated::new(1, "a")),
            boxed(UserCreated::new(2, "b")),
            boxed(UserCreated::new(3, "c")),
        ]);

        stream.next().await.unwrap();
        drop(stream);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trickle_preserves_order() {
        let ids: Vec<i64> = trickle(vec![boxed(UserCreated::new(1, "a")), boxed(UserCreated::new(2, "b"))])
            .filter_map(|m| async move { m.downcast_ref::<UserCreated>().map(|e| e.id) })
            .collect()
            .await;
        assert_eq!(ids, vec![1, 2]);
    }
}
