//! Static type tags and the type-erased view used by dynamic entry points.
//!
//! A channel element carries its [`Kind`] as an associated constant
//! ([`Element::KIND`]). Every element is also usable as `&dyn Reflect`, which
//! is how the dynamic close controller inspects arbitrary entities and how the
//! reflective receive path copies override values without knowing `T`.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use lastcall_types::{ChannelId, CloseError, Direction, Kind};

use crate::close::Cancel;
use crate::intercept::Received;

/// A type that can travel through a lastcall channel.
///
/// Implemented for the primitives, strings, std collections, smart pointers,
/// and the channel handles themselves. User types opt in with one line:
///
/// ```
/// use lastcall::{Element, Kind};
///
/// #[derive(Clone)]
/// struct Job {
///     id: u32,
/// }
///
/// impl Element for Job {
///     const KIND: Kind = Kind::Struct;
/// }
/// ```
pub trait Element: Clone + Send + Sync + 'static {
    const KIND: Kind;

    #[doc(hidden)]
    fn as_channel(&self) -> Option<&dyn ChannelHandle> {
        None
    }

    #[doc(hidden)]
    fn as_receiver(&self) -> Option<&dyn DynReceiver> {
        None
    }
}

/// Object-safe view of any [`Element`].
pub trait Reflect: Any + Send + Sync {
    fn kind(&self) -> Kind;

    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Type-aware copy: produces an independent value of the same concrete type.
    fn clone_boxed(&self) -> Box<dyn Reflect>;

    /// Channel capability, if this value is a channel handle.
    fn as_channel(&self) -> Option<&dyn ChannelHandle>;

    /// Receive capability, if this value is a channel handle that can receive.
    fn as_receiver(&self) -> Option<&dyn DynReceiver>;
}

impl<T: Element> Reflect for T {
    fn kind(&self) -> Kind {
        T::KIND
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_boxed(&self) -> Box<dyn Reflect> {
        Box::new(self.clone())
    }

    fn as_channel(&self) -> Option<&dyn ChannelHandle> {
        Element::as_channel(self)
    }

    fn as_receiver(&self) -> Option<&dyn DynReceiver> {
        Element::as_receiver(self)
    }
}

impl std::fmt::Debug for dyn Reflect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} {}>", self.kind(), self.type_name())
    }
}

/// Descriptor of a channel's element type, captured once at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementType {
    type_id: TypeId,
    type_name: &'static str,
    kind: Kind,
}

impl ElementType {
    pub fn of<T: Element>() -> ElementType {
        ElementType {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            kind: T::KIND,
        }
    }

    pub fn of_value(value: &dyn Reflect) -> ElementType {
        ElementType {
            type_id: value.as_any().type_id(),
            type_name: value.type_name(),
            kind: value.kind(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// True when `value` has exactly this element type.
    pub fn accepts(&self, value: &dyn Reflect) -> bool {
        value.as_any().type_id() == self.type_id
    }
}

/// Type-erased channel handle, as seen by the dynamic close controller.
pub trait ChannelHandle: Send + Sync {
    fn id(&self) -> ChannelId;

    fn direction(&self) -> Direction;

    fn element(&self) -> ElementType;

    /// Installs an already validated override. Only called for handles whose
    /// direction can send and whose element type accepts `value`.
    #[doc(hidden)]
    fn install(&self, value: Arc<dyn Reflect>) -> Result<Cancel, CloseError>;
}

/// Type-erased receive capability (reflective receive).
pub trait DynReceiver: Send + Sync {
    fn id(&self) -> ChannelId;

    fn element(&self) -> ElementType;

    /// Receives one value with its type discovered at run time.
    ///
    /// With `block = false` this returns `None` when nothing is ready; with
    /// `block = true` it always returns `Some`.
    fn recv_dyn(&self, block: bool) -> Option<Received<Box<dyn Reflect>>>;
}

// ── Element impls ────────────────────────────────────────────────

macro_rules! impl_element {
    ($kind:ident: $($ty:ty),+ $(,)?) => {
        $(
            impl Element for $ty {
                const KIND: Kind = Kind::$kind;
            }
        )+
    };
}

impl_element!(Unit: ());
impl_element!(Bool: bool);
impl_element!(Int: i8, i16, i32, i64, i128, isize);
impl_element!(Uint: u8, u16, u32, u64, u128, usize);
impl_element!(Float: f32, f64);
impl_element!(Char: char);
impl_element!(String: String, &'static str);

impl<T: Element> Element for Vec<T> {
    const KIND: Kind = Kind::Slice;
}

impl<T: Element, const N: usize> Element for [T; N] {
    const KIND: Kind = Kind::Array;
}

impl<T: Element> Element for Option<T> {
    const KIND: Kind = Kind::Option;
}

impl<T: Element> Element for Box<T> {
    const KIND: Kind = Kind::Pointer;
}

impl<T: Send + Sync + 'static> Element for Arc<T> {
    const KIND: Kind = Kind::Pointer;
}

impl<K, V> Element for HashMap<K, V>
where
    K: Element + Eq + Hash,
    V: Element,
{
    const KIND: Kind = Kind::Map;
}

impl<K, V> Element for BTreeMap<K, V>
where
    K: Element + Ord,
    V: Element,
{
    const KIND: Kind = Kind::Map;
}
