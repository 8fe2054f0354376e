//! Homogeneous runs of messages.

use crate::message::{Message, MessageType, TypeKey};

/// An ordered run of consecutive messages sharing one concrete type.
///
/// A batch is created from the first message of a new type and grown while
/// following messages have the exact same type. Only an empty batch has no
/// type.
///
/// # Example
///
/// ```
/// use cqea_core::{Batch, Message, MessageKind, MessageType};
///
/// #[derive(Debug)]
/// struct Ping;
///
/// impl Message for Ping {
///     fn kind(&self) -> MessageKind {
///         MessageKind::Event
///     }
/// }
///
/// let mut batch = Batch::new(Box::new(Ping));
/// assert!(batch.try_push(Box::new(Ping)).is_ok());
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.message_type(), Some(MessageType::of::<Ping>()));
/// ```
#[derive(Debug, Default)]
pub struct Batch {
    messages: Vec<Box<dyn Message>>,
}

impl Batch {
    /// Open a batch with its first message.
    #[must_use]
    pub fn new(first: Box<dyn Message>) -> Self {
        Self {
            messages: vec![first],
        }
    }

    /// An empty batch (no type).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Concrete type of the elements, `None` when empty.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        self.messages.first().map(|message| message.message_type())
    }

    /// Whether `message` has exactly the type of this batch.
    ///
    /// An empty batch accepts anything.
    #[must_use]
    pub fn accepts(&self, message: &dyn Message) -> bool {
        self.message_type()
            .is_none_or(|message_type| message_type == message.message_type())
    }

    /// Append a message of the same concrete type.
    ///
    /// # Errors
    ///
    /// Returns the message back when its type differs from the batch type.
    pub fn try_push(&mut self, message: Box<dyn Message>) -> Result<(), Box<dyn Message>> {
        if self.accepts(message.as_ref()) {
            self.messages.push(message);
            Ok(())
        } else {
            Err(message)
        }
    }

    /// Whether the batch element type is (or specializes) `key`.
    #[must_use]
    pub fn matches(&self, key: &TypeKey) -> bool {
        self.messages.first().is_some_and(|first| first.is_a(key))
    }

    /// First message of the batch.
    #[must_use]
    pub fn first(&self) -> Option<&dyn Message> {
        self.messages.first().map(AsRef::as_ref)
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the batch holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterate over the messages in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Message> {
        self.messages.iter().map(AsRef::as_ref)
    }

    /// Take the messages out of the batch.
    #[must_use]
    pub fn into_messages(self) -> Vec<Box<dyn Message>> {
        self.messages
    }
}

impl IntoIterator for Batch {
    type Item = Box<dyn Message>;
    type IntoIter = std::vec::IntoIter<Box<dyn Message>>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    #[derive(Debug)]
    struct Value(u32);

    impl Message for Value {
        fn kind(&self) -> MessageKind {
            MessageKind::Event
        }
    }

    #[derive(Debug)]
    struct Other;

    impl Message for Other {
        fn kind(&self) -> MessageKind {
            MessageKind::Event
        }
    }

    #[test]
    fn test_empty_batch_has_no_type() {
        let batch = Batch::empty();
        assert!(batch.is_empty());
        assert_eq!(batch.message_type(), None);
        assert!(!batch.matches(&TypeKey::Kind(MessageKind::Event)));
    }

    #[test]
    fn test_batch_accumulates_same_type() {
        let mut batch = Batch::new(Box::new(Value(1)));
        assert!(batch.try_push(Box::new(Value(2))).is_ok());

        assert_eq!(batch.message_type(), Some(MessageType::of::<Value>()));
        let values: Vec<u32> = batch
            .iter()
            .filter_map(|m| m.downcast_ref::<Value>())
            .map(|v| v.0)
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_batch_rejects_other_type() {
        let mut batch = Batch::new(Box::new(Value(1)));
        let rejected = batch.try_push(Box::new(Other));
        assert!(rejected.is_err());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_empty_batch_accepts_first_message() {
        let mut batch = Batch::empty();
        assert!(batch.try_push(Box::new(Other)).is_ok());
        assert_eq!(batch.message_type(), Some(MessageType::of::<Other>()));
    }
}
