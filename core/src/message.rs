//! Message trait and runtime type identity.
//!
//! Messages are opaque values produced by an external pipeline. The web layer
//! only ever inspects three things about them:
//!
//! - their exact concrete type ([`MessageType`]), used to group a stream
//!   into homogeneous batches
//! - their [`MessageKind`] (command, query, event, error or view)
//! - an optional list of declared supertypes, used for "is-a" matching
//!
//! Rust has no class inheritance, so "subclass of" is modelled as a
//! *lineage*: the concrete type first, then declared supertypes (nearest
//! first), then the kind root. An interceptor matches a message when its
//! [`TypeKey`] appears anywhere in that lineage.
//!
//! # Example
//!
//! ```
//! use cqea_core::{Message, MessageKind, MessageType, TypeKey};
//!
//! /// Marker used as an abstract supertype.
//! struct NotFound;
//!
//! #[derive(Debug)]
//! struct UserNotFound {
//!     id: String,
//! }
//!
//! impl Message for UserNotFound {
//!     fn kind(&self) -> MessageKind {
//!         MessageKind::Error
//!     }
//!
//!     fn supertypes(&self) -> Vec<MessageType> {
//!         vec![MessageType::of::<NotFound>()]
//!     }
//! }
//!
//! let error: Box<dyn Message> = Box::new(UserNotFound { id: "42".into() });
//! assert!(error.is_a(&TypeKey::of::<UserNotFound>()));
//! assert!(error.is_a(&TypeKey::of::<NotFound>()));
//! assert!(error.is_a(&TypeKey::Kind(MessageKind::Error)));
//! assert!(!error.is_a(&TypeKey::Kind(MessageKind::Event)));
//! ```

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Root category of a message in the CQEA algebra.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A request to change state.
    Command,
    /// A request to read state.
    Query,
    /// A fact about something that happened.
    Event,
    /// A domain error flowing through the result stream.
    Error,
    /// A read model produced in answer to a query.
    View,
}

impl MessageKind {
    /// Lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Query => "query",
            Self::Event => "event",
            Self::Error => "error",
            Self::View => "view",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime identity of a concrete type.
///
/// Equality and hashing only consider the [`TypeId`]; the name is carried
/// for logging and schema naming.
#[derive(Copy, Clone)]
pub struct MessageType {
    id: TypeId,
    name: &'static str,
}

impl MessageType {
    /// Identity of `T`.
    ///
    /// `T` does not have to implement [`Message`]: marker types can be used
    /// as abstract supertypes.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying [`TypeId`].
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module paths (`app::UserCreated` → `UserCreated`).
    #[must_use]
    pub fn short_name(&self) -> String {
        short_type_name(self.name)
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageType {}

impl Hash for MessageType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageType").field(&self.name).finish()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// Something an interceptor can catch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// A concrete type or a declared supertype.
    Concrete(MessageType),
    /// Every message of the given kind.
    Kind(MessageKind),
}

impl TypeKey {
    /// Key for the concrete type `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Concrete(MessageType::of::<T>())
    }
}

impl From<MessageKind> for TypeKey {
    fn from(kind: MessageKind) -> Self {
        Self::Kind(kind)
    }
}

impl From<MessageType> for TypeKey {
    fn from(message_type: MessageType) -> Self {
        Self::Concrete(message_type)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete(message_type) => write!(f, "{message_type}"),
            Self::Kind(kind) => write!(f, "<{kind}>"),
        }
    }
}

/// Upcast helper so trait objects can reach their concrete type.
#[doc(hidden)]
pub trait AsAny: Any {
    /// `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A unit of data flowing out of (or into) a pipeline.
///
/// Implement it by hand or with `#[derive(Message)]` from `cqea-macros`.
pub trait Message: AsAny + Send + Sync + fmt::Debug {
    /// Root category of this message.
    fn kind(&self) -> MessageKind;

    /// Declared supertypes, nearest first.
    fn supertypes(&self) -> Vec<MessageType> {
        Vec::new()
    }

    /// JSON form of the message, when it has one.
    ///
    /// Used by the default serializers of the web layer.
    fn to_json(&self) -> Option<serde_json::Value> {
        None
    }

    /// Fully qualified name of the concrete type.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

// Any object lifetime: the concrete type is `'static` through `AsAny`.
impl<'a> dyn Message + 'a {
    /// Exact concrete type of this message.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        MessageType {
            id: self.as_any().type_id(),
            name: self.type_name(),
        }
    }

    /// Concrete type, declared supertypes and kind root, in that order.
    #[must_use]
    pub fn lineage(&self) -> Vec<TypeKey> {
        let mut lineage = Vec::with_capacity(2);
        lineage.push(TypeKey::Concrete(self.message_type()));
        lineage.extend(self.supertypes().into_iter().map(TypeKey::Concrete));
        lineage.push(TypeKey::Kind(self.kind()));
        lineage
    }

    /// Whether this message is (or specializes) `key`.
    #[must_use]
    pub fn is_a(&self, key: &TypeKey) -> bool {
        match key {
            TypeKey::Kind(kind) => self.kind() == *kind,
            TypeKey::Concrete(message_type) => {
                self.message_type() == *message_type
                    || self.supertypes().contains(message_type)
            }
        }
    }

    /// Borrow the concrete message, if it is an `M`.
    #[must_use]
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}

/// JSON form of `message`, for `to_json` implementations.
///
/// A serialization failure is logged and yields `None`, so the message is
/// treated like one without a JSON form.
#[must_use]
pub fn json_of<T: Serialize + ?Sized>(message: &T) -> Option<serde_json::Value> {
    serde_json::to_value(message)
        .inspect_err(|e| {
            tracing::warn!(
                error = %e,
                message_type = std::any::type_name::<T>(),
                "Message could not be serialized to JSON"
            );
        })
        .ok()
}

/// Strip module paths from a type name, keeping generic structure.
///
/// ```
/// use cqea_core::short_type_name;
///
/// assert_eq!(short_type_name("app::users::UserCreated"), "UserCreated");
/// assert_eq!(short_type_name("alloc::vec::Vec<app::User>"), "Vec<User>");
/// ```
#[must_use]
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            segment.clear();
        } else if c.is_alphanumeric() || c == '_' {
            segment.push(c);
        } else {
            out.push_str(&segment);
            segment.clear();
            out.push(c);
        }
    }
    out.push_str(&segment);
    out
}
