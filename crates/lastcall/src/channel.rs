//! Channel handles that route every receive through the override policy.
//!
//! The native queue is an `async_channel` MPMC channel. Handles share one
//! [`ChannelCore`] carrying the channel identity, its element type, and the
//! override store it was created against.

use std::sync::Arc;

use async_channel::{RecvError, SendError, TryRecvError, TrySendError};
use lastcall_types::{ChannelId, CloseError, Direction, Kind};

use crate::close::{self, Cancel};
use crate::intercept::{Drained, Interceptor, Received};
use crate::reflect::{ChannelHandle, DynReceiver, Element, ElementType, Reflect};
use crate::store::OverrideStore;

pub(crate) struct ChannelCore {
    pub(crate) id: ChannelId,
    pub(crate) name: Arc<str>,
    pub(crate) element: ElementType,
    pub(crate) capacity: Option<usize>,
    pub(crate) store: Arc<OverrideStore>,
}

impl ChannelCore {
    fn new<T: Element>(
        store: Arc<OverrideStore>,
        name: String,
        capacity: Option<usize>,
    ) -> Arc<ChannelCore> {
        Arc::new(ChannelCore {
            id: ChannelId::next(),
            name: Arc::from(name),
            element: ElementType::of::<T>(),
            capacity,
            store,
        })
    }

    pub(crate) fn interceptor(&self) -> Interceptor<'_> {
        Interceptor::new(&self.store, self.id)
    }
}

/// The last handle is gone, so nothing can observe the override any more.
impl Drop for ChannelCore {
    fn drop(&mut self) {
        if self.store.delete(self.id) {
            tracing::trace!(channel = %self.id, name = %self.name, "override released with channel");
        }
    }
}

/// Sending half of a channel. Send-only direction (`chan<-`).
pub struct Sender<T> {
    inner: async_channel::Sender<T>,
    core: Arc<ChannelCore>,
}

/// Receiving half of a channel. Receive-only direction (`<-chan`).
pub struct Receiver<T> {
    inner: async_channel::Receiver<T>,
    core: Arc<ChannelCore>,
}

/// Bidirectional handle (`chan`): both halves of one channel.
pub struct Channel<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .finish_non_exhaustive()
    }
}

impl<T> std::fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .finish_non_exhaustive()
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.tx.core.id)
            .field("name", &self.tx.core.name)
            .finish_non_exhaustive()
    }
}

/// Handles compare equal when they refer to the same channel.
impl<T> PartialEq for Sender<T> {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl<T> PartialEq for Receiver<T> {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl<T> PartialEq for Channel<T> {
    fn eq(&self, other: &Self) -> bool {
        self.tx == other.tx
    }
}

// ── constructors ─────────────────────────────────────────────────

/// Creates a bounded channel registered against the global override store.
///
/// `async_channel` has no rendezvous mode, so a capacity of zero is rounded
/// up to one.
pub fn channel<T: Element>(name: impl Into<String>, capacity: usize) -> (Sender<T>, Receiver<T>) {
    channel_in(OverrideStore::global(), name, capacity)
}

/// Creates an unbounded channel registered against the global override store.
pub fn unbounded<T: Element>(name: impl Into<String>) -> (Sender<T>, Receiver<T>) {
    unbounded_in(OverrideStore::global(), name)
}

/// Creates a bounded channel whose overrides live in `store`.
pub fn channel_in<T: Element>(
    store: &Arc<OverrideStore>,
    name: impl Into<String>,
    capacity: usize,
) -> (Sender<T>, Receiver<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = async_channel::bounded(capacity);
    wrap(
        ChannelCore::new::<T>(Arc::clone(store), name.into(), Some(capacity)),
        tx,
        rx,
    )
}

/// Creates an unbounded channel whose overrides live in `store`.
pub fn unbounded_in<T: Element>(
    store: &Arc<OverrideStore>,
    name: impl Into<String>,
) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = async_channel::unbounded();
    wrap(
        ChannelCore::new::<T>(Arc::clone(store), name.into(), None),
        tx,
        rx,
    )
}

fn wrap<T>(
    core: Arc<ChannelCore>,
    tx: async_channel::Sender<T>,
    rx: async_channel::Receiver<T>,
) -> (Sender<T>, Receiver<T>) {
    (
        Sender {
            inner: tx,
            core: Arc::clone(&core),
        },
        Receiver { inner: rx, core },
    )
}

// ── Sender ───────────────────────────────────────────────────────

impl<T> Sender<T> {
    pub fn id(&self) -> ChannelId {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Sends a value, waiting for buffer space, matching [`async_channel::Sender::send`].
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.inner.send(value).await
    }

    /// Blocking variant of [`Sender::send`]. Do not call from async code.
    pub fn send_blocking(&self, value: T) -> Result<(), SendError<T>> {
        self.inner.send_blocking(value)
    }

    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.inner.try_send(value)
    }

    /// Closes the channel without an override.
    ///
    /// Returns `true` if this call closed it. Buffered values are still
    /// delivered; after that receivers observe [`Received::Closed`].
    pub fn close(&self) -> bool {
        let closed = self.inner.close();
        if closed {
            tracing::debug!(channel = %self.core.id, name = %self.core.name, "channel closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of values currently buffered.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Buffer capacity (`None` for unbounded channels).
    pub fn capacity(&self) -> Option<usize> {
        self.core.capacity
    }
}

impl<T: Element> Sender<T> {
    /// Closes the channel so that, once drained, every receive yields `value`.
    ///
    /// Calling this again while the override is installed only replaces the
    /// value. Fails with [`CloseError::AlreadyClosed`] if the channel was
    /// closed by other means or the override was cancelled.
    pub fn close_with_value(&self, value: T) -> Result<Cancel, CloseError> {
        close::install(&self.core, &self.inner, Arc::new(value))
    }
}

// ── Receiver ─────────────────────────────────────────────────────

impl<T> Receiver<T> {
    pub fn id(&self) -> ChannelId {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.core.capacity
    }

    pub(crate) fn native(&self) -> &async_channel::Receiver<T> {
        &self.inner
    }

    pub(crate) fn core(&self) -> &Arc<ChannelCore> {
        &self.core
    }
}

impl<T: Element> Receiver<T> {
    /// Receives the next value, waiting until one is sent or the channel is
    /// closed and drained.
    ///
    /// Cancel-safe: dropping the future before it completes never loses a
    /// value, so it can be raced in `tokio::select!`.
    pub async fn recv(&self) -> Received<T> {
        let native = self.inner.recv().await.map_err(|RecvError| Drained);
        self.core.interceptor().resolve_typed(native)
    }

    /// Blocking variant of [`Receiver::recv`]. Do not call from async code.
    pub fn recv_blocking(&self) -> Received<T> {
        let native = self.inner.recv_blocking().map_err(|RecvError| Drained);
        self.core.interceptor().resolve_typed(native)
    }

    /// Non-blocking receive. `None` means nothing is ready yet.
    pub fn try_recv(&self) -> Option<Received<T>> {
        let native = match self.inner.try_recv() {
            Ok(value) => Ok(value),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(Drained),
        };
        Some(self.core.interceptor().resolve_typed(native))
    }

    /// Type-erased view for reflective receive.
    pub fn as_dyn(&self) -> &dyn DynReceiver {
        self
    }
}

// ── Channel ──────────────────────────────────────────────────────

impl<T: Element> Channel<T> {
    /// Bounded bidirectional channel on the global store.
    pub fn new(name: impl Into<String>, capacity: usize) -> Channel<T> {
        Self::from_halves(channel(name, capacity))
    }

    pub fn unbounded(name: impl Into<String>) -> Channel<T> {
        Self::from_halves(unbounded(name))
    }

    pub fn new_in(store: &Arc<OverrideStore>, name: impl Into<String>, capacity: usize) -> Channel<T> {
        Self::from_halves(channel_in(store, name, capacity))
    }

    pub fn unbounded_in(store: &Arc<OverrideStore>, name: impl Into<String>) -> Channel<T> {
        Self::from_halves(unbounded_in(store, name))
    }

    pub async fn recv(&self) -> Received<T> {
        self.rx.recv().await
    }

    pub fn recv_blocking(&self) -> Received<T> {
        self.rx.recv_blocking()
    }

    pub fn try_recv(&self) -> Option<Received<T>> {
        self.rx.try_recv()
    }

    pub fn close_with_value(&self, value: T) -> Result<Cancel, CloseError> {
        self.tx.close_with_value(value)
    }
}

impl<T> Channel<T> {
    fn from_halves((tx, rx): (Sender<T>, Receiver<T>)) -> Channel<T> {
        Channel { tx, rx }
    }

    pub fn id(&self) -> ChannelId {
        self.tx.id()
    }

    pub fn name(&self) -> &str {
        self.tx.name()
    }

    pub fn sender(&self) -> &Sender<T> {
        &self.tx
    }

    pub fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }

    pub fn split(self) -> (Sender<T>, Receiver<T>) {
        (self.tx, self.rx)
    }

    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.tx.send(value).await
    }

    pub fn send_blocking(&self, value: T) -> Result<(), SendError<T>> {
        self.tx.send_blocking(value)
    }

    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.tx.try_send(value)
    }

    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

// ── type-erased views ────────────────────────────────────────────

impl<T: Element> ChannelHandle for Sender<T> {
    fn id(&self) -> ChannelId {
        self.core.id
    }

    fn direction(&self) -> Direction {
        Direction::Send
    }

    fn element(&self) -> ElementType {
        self.core.element
    }

    fn install(&self, value: Arc<dyn Reflect>) -> Result<Cancel, CloseError> {
        close::install(&self.core, &self.inner, value)
    }
}

impl<T: Element> ChannelHandle for Receiver<T> {
    fn id(&self) -> ChannelId {
        self.core.id
    }

    fn direction(&self) -> Direction {
        Direction::Recv
    }

    fn element(&self) -> ElementType {
        self.core.element
    }

    fn install(&self, _value: Arc<dyn Reflect>) -> Result<Cancel, CloseError> {
        Err(CloseError::NotWritableChannel {
            kind: Kind::Chan,
            direction: Some(Direction::Recv),
        })
    }
}

impl<T: Element> ChannelHandle for Channel<T> {
    fn id(&self) -> ChannelId {
        self.tx.core.id
    }

    fn direction(&self) -> Direction {
        Direction::Both
    }

    fn element(&self) -> ElementType {
        self.tx.core.element
    }

    fn install(&self, value: Arc<dyn Reflect>) -> Result<Cancel, CloseError> {
        ChannelHandle::install(&self.tx, value)
    }
}

impl<T: Element> DynReceiver for Receiver<T> {
    fn id(&self) -> ChannelId {
        self.core.id
    }

    fn element(&self) -> ElementType {
        self.core.element
    }

    fn recv_dyn(&self, block: bool) -> Option<Received<Box<dyn Reflect>>> {
        let native = if block {
            self.inner.recv_blocking().map_err(|RecvError| Drained)
        } else {
            match self.inner.try_recv() {
                Ok(value) => Ok(value),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => Err(Drained),
            }
        };
        let native = native.map(|value| Box::new(value) as Box<dyn Reflect>);
        Some(self.core.interceptor().resolve_dyn(native))
    }
}

impl<T: Element> DynReceiver for Channel<T> {
    fn id(&self) -> ChannelId {
        self.rx.core.id
    }

    fn element(&self) -> ElementType {
        self.rx.core.element
    }

    fn recv_dyn(&self, block: bool) -> Option<Received<Box<dyn Reflect>>> {
        self.rx.recv_dyn(block)
    }
}

impl<T: Element> Element for Sender<T> {
    const KIND: Kind = Kind::Chan;

    fn as_channel(&self) -> Option<&dyn ChannelHandle> {
        Some(self)
    }
}

impl<T: Element> Element for Receiver<T> {
    const KIND: Kind = Kind::Chan;

    fn as_channel(&self) -> Option<&dyn ChannelHandle> {
        Some(self)
    }

    fn as_receiver(&self) -> Option<&dyn DynReceiver> {
        Some(self)
    }
}

impl<T: Element> Element for Channel<T> {
    const KIND: Kind = Kind::Chan;

    fn as_channel(&self) -> Option<&dyn ChannelHandle> {
        Some(self)
    }

    fn as_receiver(&self) -> Option<&dyn DynReceiver> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;

    fn store() -> Arc<OverrideStore> {
        Arc::new(OverrideStore::new())
    }

    #[test]
    fn buffered_values_drain_before_the_override() {
        let store = store();
        let (tx, rx) = channel_in::<i32>(&store, "drain", 2);
        tx.try_send(1).unwrap();
        tx.close_with_value(10).unwrap();

        assert_eq!(rx.recv_blocking(), Received::Value(1));
        assert_eq!(rx.recv_blocking(), Received::Override(10));
        assert_eq!(rx.recv_blocking(), Received::Override(10));
    }

    #[test]
    fn plain_close_yields_closed() {
        let store = store();
        let (tx, rx) = channel_in::<u8>(&store, "plain", 1);
        assert!(tx.close());
        assert!(!tx.close());
        assert_eq!(rx.try_recv(), Some(Received::Closed));
        assert_eq!(rx.recv_blocking().into_pair(), (0, false));
    }

    #[test]
    fn try_recv_on_open_empty_channel_is_not_ready() {
        let store = store();
        let (_tx, rx) = channel_in::<u8>(&store, "idle", 4);
        assert_eq!(rx.try_recv(), None);
        assert_eq!(rx.as_dyn().recv_dyn(false).map(|r| r.is_received()), None);
    }

    #[test]
    fn zero_capacity_rounds_up_to_one() {
        let store = store();
        let (tx, _rx) = channel_in::<u8>(&store, "zero", 0);
        assert_eq!(tx.capacity(), Some(1));
        tx.try_send(1).unwrap();
        assert!(matches!(tx.try_send(2), Err(TrySendError::Full(2))));
    }

    #[test]
    fn handles_share_identity() {
        let store = store();
        let ch = Channel::<String>::new_in(&store, "shared", 1);
        assert_eq!(ch.sender().id(), ch.receiver().id());
        assert_eq!(ch.clone(), ch);
        assert_eq!(ch.name(), "shared");

        let other = Channel::<String>::new_in(&store, "shared", 1);
        assert_ne!(other.id(), ch.id());
    }

    #[test]
    fn send_after_close_with_value_fails() {
        let store = store();
        let ch = Channel::<i32>::new_in(&store, "closed", 1);
        ch.close_with_value(10).unwrap();
        assert!(ch.try_send(1).is_err());
        assert!(ch.send_blocking(1).is_err());
    }

    #[test]
    fn dropping_every_handle_releases_the_override() {
        let store = store();
        let (tx, rx) = channel_in::<Vec<u8>>(&store, "req", 1);
        let cancel = tx.close_with_value(vec![0; 1024]).unwrap();
        assert_eq!(store.len(), 1);

        drop(tx);
        assert_eq!(store.len(), 1, "a live receiver still observes the override");
        let rx2 = rx.clone();
        drop(rx);
        assert_eq!(rx2.recv_blocking(), Received::Override(vec![0; 1024]));
        drop(rx2);
        assert!(store.is_empty());

        cancel.cancel();
        assert!(cancel.is_cancelled());
        assert!(store.is_empty());
    }

    #[test]
    fn many_short_lived_channels_do_not_accumulate() {
        let store = store();
        for _ in 0..1000 {
            let (tx, rx) = channel_in::<Vec<u8>>(&store, "req", 1);
            tx.close_with_value(vec![0; 64]).unwrap();
            drop((tx, rx));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn override_owning_the_last_handle_of_another_channel() {
        let store = Arc::new(OverrideStore::with_config(StoreConfig { shards: 1 }));
        let inner = Channel::<i32>::new_in(&store, "inner", 1);
        inner.close_with_value(5).unwrap();
        let outer = Channel::<Channel<i32>>::new_in(&store, "outer", 1);
        outer.close_with_value(inner).unwrap();
        assert_eq!(store.len(), 2);

        let replacement = Channel::<i32>::new_in(&store, "replacement", 1);
        replacement.close_with_value(6).unwrap();
        outer.close_with_value(replacement).unwrap();
        assert_eq!(store.len(), 2, "replaced inner channel released its entry");

        drop(outer);
        assert!(store.is_empty());
    }

    #[test]
    fn directions_of_type_erased_handles() {
        let store = store();
        let ch = Channel::<i32>::new_in(&store, "dirs", 1);
        assert_eq!(ChannelHandle::direction(&ch), Direction::Both);
        assert_eq!(ChannelHandle::direction(ch.sender()), Direction::Send);
        assert_eq!(ChannelHandle::direction(ch.receiver()), Direction::Recv);
        assert_eq!(ChannelHandle::element(&ch).kind(), Kind::Int);
    }
}
