//! The receive policy shared by every receive surface.
//!
//! Each surface performs its native receive first and hands the outcome to
//! [`Interceptor::resolve`] together with a copy routine. Real data always
//! passes through untouched; only a closed-and-drained outcome consults the
//! override store.

use lastcall_types::ChannelId;

use crate::reflect::{Element, Reflect};
use crate::store::OverrideStore;

/// Result of one receive on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Received<T> {
    /// A value that was sent on the channel.
    Value(T),
    /// The channel is closed and drained; this is its override value.
    Override(T),
    /// The channel is closed and drained and has no override.
    Closed,
}

impl<T> Received<T> {
    /// True only for values that were actually sent.
    pub fn is_received(&self) -> bool {
        matches!(self, Received::Value(_))
    }

    pub fn is_override(&self) -> bool {
        matches!(self, Received::Override(_))
    }

    /// The carried value, whether sent or substituted.
    pub fn value(self) -> Option<T> {
        match self {
            Received::Value(v) | Received::Override(v) => Some(v),
            Received::Closed => None,
        }
    }

    pub fn as_ref(&self) -> Received<&T> {
        match self {
            Received::Value(v) => Received::Value(v),
            Received::Override(v) => Received::Override(v),
            Received::Closed => Received::Closed,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Received<U> {
        match self {
            Received::Value(v) => Received::Value(f(v)),
            Received::Override(v) => Received::Override(f(v)),
            Received::Closed => Received::Closed,
        }
    }

    /// The `(value, received)` pair, with `T::default()` standing in for a
    /// closed channel without override.
    pub fn into_pair(self) -> (T, bool)
    where
        T: Default,
    {
        let received = self.is_received();
        (self.value().unwrap_or_default(), received)
    }

    /// Single-result form of [`Received::into_pair`].
    pub fn into_value(self) -> T
    where
        T: Default,
    {
        self.value().unwrap_or_default()
    }
}

impl Received<Box<dyn Reflect>> {
    /// Recovers the typed view of a reflective receive.
    ///
    /// Returns `self` unchanged when the carried value is not a `T`.
    pub fn downcast<T: Element>(self) -> Result<Received<T>, Self> {
        let matches = match &self {
            Received::Value(v) | Received::Override(v) => v.as_any().is::<T>(),
            Received::Closed => true,
        };
        if !matches {
            return Err(self);
        }
        Ok(self.map(unbox::<T>))
    }
}

fn unbox<T: Element>(value: Box<dyn Reflect>) -> T {
    match value.into_any().downcast::<T>() {
        Ok(v) => *v,
        Err(_) => unreachable!("type checked by caller"),
    }
}

/// Native outcome meaning "closed and nothing left to deliver".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Drained;

pub(crate) struct Interceptor<'a> {
    store: &'a OverrideStore,
    id: ChannelId,
}

impl<'a> Interceptor<'a> {
    pub(crate) fn new(store: &'a OverrideStore, id: ChannelId) -> Self {
        Interceptor { store, id }
    }

    /// Applies the override policy to one native receive outcome.
    ///
    /// `copy` turns the stored value into the destination representation; it
    /// returns `None` when the stored value cannot fill this destination, which
    /// is treated like a missing entry.
    pub(crate) fn resolve<D>(
        &self,
        native: Result<D, Drained>,
        copy: impl FnOnce(&dyn Reflect) -> Option<D>,
    ) -> Received<D> {
        if let Ok(value) = native {
            return Received::Value(value);
        }
        let Some(stored) = self.store.get(self.id) else {
            return Received::Closed;
        };
        match copy(&*stored) {
            Some(value) => {
                tracing::trace!(channel = %self.id, "delivering override value");
                Received::Override(value)
            }
            None => Received::Closed,
        }
    }

    pub(crate) fn resolve_typed<T: Element>(&self, native: Result<T, Drained>) -> Received<T> {
        self.resolve(native, copy_typed::<T>)
    }

    pub(crate) fn resolve_dyn(
        &self,
        native: Result<Box<dyn Reflect>, Drained>,
    ) -> Received<Box<dyn Reflect>> {
        self.resolve(native, |stored| Some(stored.clone_boxed()))
    }

    /// Destination absent: the caller only learns which state the channel is in.
    pub(crate) fn resolve_discard(&self, native: Result<(), Drained>) -> Received<()> {
        self.resolve(native, |_| Some(()))
    }
}

fn copy_typed<T: Element>(stored: &dyn Reflect) -> Option<T> {
    stored.as_any().downcast_ref::<T>().cloned()
}
