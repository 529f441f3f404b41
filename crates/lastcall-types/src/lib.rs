//! Plain data shared by the lastcall crates.
//!
//! Channel identities, element kind tags, and the errors surfaced by
//! close-with-value live here so that diagnostics consumers can read store
//! snapshots without depending on the channel implementation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use facet::Facet;

// ── Identity ─────────────────────────────────────────────────────

/// Opaque, stable identity of one channel instance.
///
/// Every clone of a channel handle shares the same id. Ids are never reused
/// within a process.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// Allocates the next id from the process-wide counter.
    pub fn next() -> ChannelId {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ChannelId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan#{}", self.0)
    }
}

// ── Kinds ────────────────────────────────────────────────────────

/// Coarse shape of a value, used for validation errors and diagnostics.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Kind {
    Unit,
    Bool,
    Int,
    Uint,
    Float,
    Char,
    String,
    Slice,
    Array,
    Map,
    Option,
    Pointer,
    Chan,
    Struct,
    Enum,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Unit => "unit",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Float => "float",
            Kind::Char => "char",
            Kind::String => "string",
            Kind::Slice => "slice",
            Kind::Array => "array",
            Kind::Map => "map",
            Kind::Option => "option",
            Kind::Pointer => "ptr",
            Kind::Chan => "chan",
            Kind::Struct => "struct",
            Kind::Enum => "enum",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which operations a channel handle permits.
#[derive(Facet, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Direction {
    /// Send-only handle (`chan<-`).
    Send,
    /// Receive-only handle (`<-chan`).
    Recv,
    /// Bidirectional handle (`chan`).
    Both,
}

impl Direction {
    pub fn can_send(self) -> bool {
        matches!(self, Direction::Send | Direction::Both)
    }

    pub fn can_recv(self) -> bool {
        matches!(self, Direction::Recv | Direction::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => f.write_str("chan<-"),
            Direction::Recv => f.write_str("<-chan"),
            Direction::Both => f.write_str("chan"),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────

/// Why a close-with-value request was refused.
///
/// Nothing is mutated when one of these is returned: the channel stays in
/// whatever state it was in and no override is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseError {
    /// The entity is not a channel, or is a channel without send capability.
    NotWritableChannel {
        kind: Kind,
        direction: Option<Direction>,
    },
    /// The override value's type differs from the channel's element type.
    ///
    /// The type names disambiguate mismatches within one kind, such as an
    /// `i32` offered to a channel of `i64`.
    ChannelTypeMismatch {
        value: Kind,
        channel: Kind,
        value_type: &'static str,
        channel_type: &'static str,
    },
    /// The channel was closed without an installed override (plain close, or
    /// an earlier override that has since been cancelled).
    AlreadyClosed { channel: ChannelId },
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotWritableChannel {
                direction: Some(direction),
                ..
            } => write!(f, "provided entity \"{direction}\" is not a writable channel"),
            Self::NotWritableChannel {
                kind,
                direction: None,
            } => write!(f, "provided entity kind \"{kind}\" is not a writable channel"),
            Self::ChannelTypeMismatch {
                value,
                channel,
                value_type,
                channel_type,
            } if value == channel => write!(
                f,
                "provided value type \"{value_type}\" doesn't match provided channel element type \"{channel_type}\" (both kind \"{value}\")"
            ),
            Self::ChannelTypeMismatch { value, channel, .. } => write!(
                f,
                "provided value kind \"{value}\" doesn't match provided channel kind \"{channel}\""
            ),
            Self::AlreadyClosed { channel } => write!(f, "channel {channel} is already closed"),
        }
    }
}

impl std::error::Error for CloseError {}

// ── Snapshots ────────────────────────────────────────────────────

/// Point-in-time listing of every installed override.
#[derive(Debug, Clone, Facet)]
pub struct StoreSnapshot {
    pub shards: u32,
    pub overrides: Vec<OverrideSnapshot>,
}

/// One installed override.
#[derive(Debug, Clone, Facet)]
pub struct OverrideSnapshot {
    pub channel_id: ChannelId,
    /// Human-facing channel name given at creation.
    pub channel_name: String,
    pub element_type: String,
    pub kind: Kind,
    /// How many times the value was replaced after the first install.
    pub replacements: u64,
    pub age_secs: f64,
}
