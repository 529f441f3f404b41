//! Multi-way receive over several channels.
//!
//! The native receive futures race; the first one to complete wins and is the
//! only one that consumes anything (the others are dropped, which never loses
//! a value). The override policy is then applied to the winning case alone,
//! when the caller completes it with [`SelectedOperation::recv`].

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use futures_util::future::select_all;
use lastcall_types::ChannelId;

use crate::channel::Receiver;
use crate::intercept::{Drained, Interceptor, Received};
use crate::reflect::Element;
use crate::store::OverrideStore;

type Outcome = Option<Box<dyn Any + Send>>;
type CaseFuture<'a> = Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;

static NEXT_START: AtomicUsize = AtomicUsize::new(0);

struct Case<'a> {
    id: ChannelId,
    store: &'a OverrideStore,
    start: Box<dyn Fn() -> CaseFuture<'a> + Send + Sync + 'a>,
}

/// A set of receive cases to wait on together.
///
/// ```
/// use lastcall::{Received, Select, channel};
///
/// let (tx_a, rx_a) = channel::<i32>("a", 1);
/// let (_tx_b, rx_b) = channel::<&'static str>("b", 1);
/// tx_a.close_with_value(7).unwrap();
///
/// let mut sel = Select::new();
/// let a = sel.recv(&rx_a);
/// let b = sel.recv(&rx_b);
///
/// let op = sel.select_blocking();
/// match op.index() {
///     i if i == a => assert_eq!(op.recv(&rx_a), Received::Override(7)),
///     i if i == b => unreachable!("b never becomes ready"),
///     _ => unreachable!(),
/// }
/// ```
pub struct Select<'a> {
    cases: Vec<Case<'a>>,
    next_start: usize,
}

impl Default for Select<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Select<'a> {
    pub fn new() -> Self {
        Select {
            cases: Vec::new(),
            next_start: NEXT_START.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Adds a receive case and returns its index.
    pub fn recv<T: Element>(&mut self, rx: &'a Receiver<T>) -> usize {
        let native = rx.native();
        self.cases.push(Case {
            id: rx.id(),
            store: &rx.core().store,
            start: Box::new(move || {
                async move {
                    native
                        .recv()
                        .await
                        .ok()
                        .map(|value| Box::new(value) as Box<dyn Any + Send>)
                }
                .boxed()
            }),
        });
        self.cases.len() - 1
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Waits until one case is ready and completes its native receive.
    ///
    /// Ties are broken by rotating the starting case between calls. With no
    /// cases this never resolves.
    pub async fn select(&mut self) -> SelectedOperation<'a> {
        let count = self.cases.len();
        if count == 0 {
            return std::future::pending().await;
        }
        let first = self.next_start % count;
        self.next_start = self.next_start.wrapping_add(1);

        let racers = (0..count).map(|offset| {
            let index = (first + offset) % count;
            let native = (self.cases[index].start)();
            async move { (index, native.await) }.boxed()
        });
        let ((index, outcome), _, _) = select_all(racers).await;

        let case = &self.cases[index];
        tracing::trace!(channel = %case.id, index, "select case won");
        SelectedOperation {
            index,
            id: case.id,
            store: case.store,
            outcome,
        }
    }

    /// Blocking variant of [`Select::select`]. Do not call from async code.
    pub fn select_blocking(&mut self) -> SelectedOperation<'a> {
        futures_executor::block_on(self.select())
    }

    /// Non-blocking select: `None` when no case is ready right now.
    pub fn try_select(&mut self) -> Option<SelectedOperation<'a>> {
        self.select().now_or_never()
    }
}

/// The winning case of a [`Select`].
///
/// The native receive has already happened. Complete it with
/// [`SelectedOperation::recv`] or [`SelectedOperation::discard`]; dropping the
/// operation discards a received value.
#[must_use = "the selected value is lost unless the operation is completed"]
pub struct SelectedOperation<'a> {
    index: usize,
    id: ChannelId,
    store: &'a OverrideStore,
    outcome: Outcome,
}

impl SelectedOperation<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn channel_id(&self) -> ChannelId {
        self.id
    }

    /// Completes the operation with the winning receiver.
    ///
    /// # Panics
    ///
    /// If `rx` is not the receiver of the winning case.
    pub fn recv<T: Element>(self, rx: &Receiver<T>) -> Received<T> {
        assert_eq!(
            rx.id(),
            self.id,
            "passed a receiver that wasn't selected"
        );
        let native = self
            .outcome
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
            .ok_or(Drained);
        Interceptor::new(self.store, self.id).resolve_typed(native)
    }

    /// Completes the operation without a destination.
    pub fn discard(self) -> Received<()> {
        let native = self.outcome.map(drop).ok_or(Drained);
        Interceptor::new(self.store, self.id).resolve_discard(native)
    }
}

impl std::fmt::Debug for SelectedOperation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedOperation")
            .field("index", &self.index)
            .field("channel", &self.id)
            .field("received", &self.outcome.is_some())
            .finish()
    }
}
