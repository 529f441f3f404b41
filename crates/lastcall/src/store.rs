//! Concurrent registry of close-with-value overrides, keyed by channel identity.
//!
//! The map is split into shards, each behind its own `parking_lot::RwLock`.
//! Receivers only ever take a shared lock on the one shard their channel
//! hashes to, so lookups on unrelated channels never contend.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use lastcall_types::{ChannelId, OverrideSnapshot, StoreSnapshot};
use parking_lot::RwLock;

use crate::reflect::{Element, ElementType, Reflect};

pub const DEFAULT_SHARDS: usize = 16;
pub const SHARDS_ENV: &str = "LASTCALL_STORE_SHARDS";

static GLOBAL: LazyLock<Arc<OverrideStore>> =
    LazyLock::new(|| Arc::new(OverrideStore::with_config(StoreConfig::from_env())));

/// Tuning for an [`OverrideStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of independently locked shards. Zero is treated as one.
    pub shards: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            shards: DEFAULT_SHARDS,
        }
    }
}

impl StoreConfig {
    /// Reads `LASTCALL_STORE_SHARDS`, falling back to the default when it is
    /// unset, unparsable, or zero.
    pub fn from_env() -> StoreConfig {
        Self::from_shards_var(std::env::var(SHARDS_ENV).ok().as_deref())
    }

    fn from_shards_var(raw: Option<&str>) -> StoreConfig {
        let shards = raw
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_SHARDS);
        StoreConfig { shards }
    }
}

/// The value a channel yields once it is closed and drained.
#[derive(Clone)]
pub struct OverrideEntry {
    value: Arc<dyn Reflect>,
    channel_name: Arc<str>,
    installed_at: Instant,
    replacements: u64,
}

impl OverrideEntry {
    pub fn new(value: Arc<dyn Reflect>) -> OverrideEntry {
        OverrideEntry {
            value,
            channel_name: Arc::from(""),
            installed_at: Instant::now(),
            replacements: 0,
        }
    }

    pub fn labeled(mut self, channel_name: Arc<str>) -> OverrideEntry {
        self.channel_name = channel_name;
        self
    }

    pub fn value(&self) -> &Arc<dyn Reflect> {
        &self.value
    }

    fn snapshot(&self, id: ChannelId, now: Instant) -> OverrideSnapshot {
        let element = ElementType::of_value(&*self.value);
        OverrideSnapshot {
            channel_id: id,
            channel_name: self.channel_name.to_string(),
            element_type: element.type_name().to_string(),
            kind: element.kind(),
            replacements: self.replacements,
            age_secs: now.duration_since(self.installed_at).as_secs_f64(),
        }
    }
}

/// Outcome of [`OverrideStore::install`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Install {
    /// The native close ran and the entry was inserted.
    Closed,
    /// An entry already existed; only its value changed.
    Replaced,
    /// No entry existed and the native close reported the channel was
    /// already closed. Nothing was inserted.
    Rejected,
}

type Shard = RwLock<HashMap<ChannelId, OverrideEntry>>;

pub struct OverrideStore {
    shards: Box<[Shard]>,
}

impl Default for OverrideStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OverrideStore {
    pub fn new() -> OverrideStore {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> OverrideStore {
        let shards = (0..config.shards.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        OverrideStore { shards }
    }

    /// Process-wide store used by channels created without an explicit one.
    ///
    /// Initialised on first use from [`StoreConfig::from_env`].
    pub fn global() -> &'static Arc<OverrideStore> {
        &GLOBAL
    }

    fn shard(&self, id: ChannelId) -> &Shard {
        &self.shards[(id.as_u64() % self.shards.len() as u64) as usize]
    }

    /// Inserts or replaces the entry for `id`.
    pub fn set(&self, id: ChannelId, entry: OverrideEntry) {
        // Replaced values drop outside the lock: they may own the last handle
        // of another channel, whose drop calls back into the store.
        let previous = self.shard(id).write().insert(id, entry);
        drop(previous);
    }

    pub fn get(&self, id: ChannelId) -> Option<Arc<dyn Reflect>> {
        self.shard(id)
            .read()
            .get(&id)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Typed lookup. An entry of a different type reads as absent.
    pub fn get_as<T: Element>(&self, id: ChannelId) -> Option<T> {
        let value = self.get(id)?;
        value.as_any().downcast_ref::<T>().cloned()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.shard(id).read().contains_key(&id)
    }

    /// Removes the entry for `id`. Returns whether one was present.
    pub fn delete(&self, id: ChannelId) -> bool {
        let removed = self.shard(id).write().remove(&id);
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    /// Check-and-close, atomic with respect to lookups on the same channel.
    ///
    /// With the shard write lock held: an existing entry has its value
    /// replaced and `close` is not called; otherwise `close` runs and the entry
    /// is inserted only if `close` reports that it performed the transition.
    /// A receiver woken by that close blocks on the shard lock until the entry
    /// is visible.
    pub fn install(
        &self,
        id: ChannelId,
        entry: OverrideEntry,
        close: impl FnOnce() -> bool,
    ) -> Install {
        let mut shard = self.shard(id).write();
        if let Some(existing) = shard.get_mut(&id) {
            let previous = std::mem::replace(&mut existing.value, entry.value);
            existing.replacements += 1;
            drop(shard);
            drop(previous);
            return Install::Replaced;
        }
        if !close() {
            return Install::Rejected;
        }
        shard.insert(id, entry);
        Install::Closed
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let now = Instant::now();
        let mut overrides: Vec<OverrideSnapshot> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .iter()
                    .map(|(id, entry)| entry.snapshot(*id, now))
                    .collect::<Vec<_>>()
            })
            .collect();
        overrides.sort_by_key(|o| o.channel_id);
        StoreSnapshot {
            shards: self.shards.len() as u32,
            overrides,
        }
    }
}

impl std::fmt::Debug for OverrideStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideStore")
            .field("shards", &self.shards.len())
            .field("len", &self.len())
            .finish()
    }
}
