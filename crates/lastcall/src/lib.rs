//! Channels that can be closed with a value.
//!
//! A channel closed with [`Sender::close_with_value`] first delivers every
//! value that was already buffered, then yields the override value on every
//! later receive instead of reporting a bare close:
//!
//! ```
//! use lastcall::{Received, channel};
//!
//! let (tx, rx) = channel::<i32>("jobs", 2);
//! tx.try_send(1).unwrap();
//! tx.close_with_value(10).unwrap();
//!
//! assert_eq!(rx.recv_blocking(), Received::Value(1));
//! assert_eq!(rx.recv_blocking(), Received::Override(10));
//! assert_eq!(rx.recv_blocking().into_pair(), (10, false));
//! ```
//!
//! Every way of receiving observes the same override: [`Receiver::recv`],
//! [`Receiver::recv_blocking`], [`Receiver::try_recv`], [`Select`], and
//! reflective receive through [`DynReceiver`]. Overrides live in an
//! [`OverrideStore`]; channels use [`OverrideStore::global`] unless created
//! with [`channel_in`] / [`unbounded_in`].
//!
//! Closing a channel that is only known as `&dyn Reflect` goes through
//! [`close_with_value`], which validates direction and element type at run
//! time.

mod channel;
mod close;
mod intercept;
mod reflect;
mod select;
mod store;

pub use channel::{Channel, Receiver, Sender, channel, channel_in, unbounded, unbounded_in};
pub use close::{Cancel, close_with_value};
pub use intercept::Received;
pub use reflect::{ChannelHandle, DynReceiver, Element, ElementType, Reflect};
pub use select::{Select, SelectedOperation};
pub use store::{
    DEFAULT_SHARDS, Install, OverrideEntry, OverrideStore, SHARDS_ENV, StoreConfig,
};

pub use lastcall_types::{
    ChannelId, CloseError, Direction, Kind, OverrideSnapshot, StoreSnapshot,
};

pub use async_channel::{SendError, TrySendError};
