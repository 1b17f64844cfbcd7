//! Channel store: queue semantics over a [`StorageEngine`].
//!
//! Each channel is one redb table mapping item key to encoded payload.
//! redb keeps `&str` keys in byte order, so pops come out in ascending
//! lexicographic key order, not arrival order.

use redb::{
    ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition, TableHandle,
    WriteTransaction,
};
use std::collections::BTreeMap;

use super::engine::{StorageEngine, write_table_exists};
use crate::constants::{FALLBACK_CHANNEL, LOCK_TABLE, MAX_POP_COUNT, PAUSE_TABLE, RESERVED_PREFIX};
use crate::error::{Error, Result, StorageContext};
use crate::item::Item;

type StrTable<'a> = TableDefinition<'a, &'static str, &'static str>;
type CounterTable<'a> = TableDefinition<'a, &'static str, u64>;

/// Whether a table name belongs to engine state rather than a channel.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Non-empty and outside the reserved namespace. redb rejects empty table
/// names outright.
fn is_channel_name(name: &str) -> bool {
    !name.is_empty() && !is_reserved(name)
}

/// Map a requested pop count onto `1..=10`. Zero and negatives mean one.
pub fn clamp_pop_count(requested: i64) -> usize {
    usize::try_from(requested)
        .unwrap_or(1)
        .clamp(1, MAX_POP_COUNT)
}

/// Queue operations for one application.
///
/// Every method runs in exactly one transaction. `ChannelStore` is `Clone`
/// and cheap to move into blocking tasks.
#[derive(Clone, Debug)]
pub struct ChannelStore {
    engine: StorageEngine,
}

impl ChannelStore {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    /// Upserts an item into its channel, creating the channel on first use.
    ///
    /// Returns the parsed item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidItem`] for an empty channel or key, or a
    /// storage error if the write fails.
    pub fn push(&self, raw: &str) -> Result<Item> {
        let item: Item = raw.parse()?;

        self.engine.write(|txn| {
            let mut table = txn
                .open_table(StrTable::new(item.channel()))
                .with_storage(|| format!("Failed to open channel '{}'", item.channel()))?;
            table
                .insert(item.key(), item.raw_payload().unwrap_or_default())
                .with_storage(|| format!("Failed to insert key '{}'", item.key()))?;
            Ok(())
        })?;

        Ok(item)
    }

    /// Removes up to `count` items (clamped to `1..=10`) in ascending key
    /// order and returns them as `channel.key[.payload]`.
    ///
    /// A missing or empty channel yields an empty vec.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the transaction fails; nothing is removed
    /// in that case.
    pub fn pop(&self, channel: &str, count: usize) -> Result<Vec<String>> {
        self.pop_guarded(None, channel, count)
    }

    /// Like [`pop`](Self::pop), but checks `pause_key` in the pause table
    /// inside the same write transaction. A pause committed before this
    /// transaction began is always seen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelPaused`] without removing anything if the
    /// flag is set, or a storage error.
    pub fn pop_unless_paused(&self, pause_key: &str, channel: &str, count: usize) -> Result<Vec<String>> {
        self.pop_guarded(Some(pause_key), channel, count)
    }

    fn pop_guarded(&self, pause_key: Option<&str>, channel: &str, count: usize) -> Result<Vec<String>> {
        let count = count.clamp(1, MAX_POP_COUNT);
        if !is_channel_name(channel) {
            return Ok(Vec::new());
        }

        self.engine.write(|txn| {
            if let Some(key) = pause_key
                && flag_set(txn, PAUSE_TABLE, key)?
            {
                return Err(Error::channel_paused(channel));
            }
            if !write_table_exists(txn, channel)? {
                return Ok(Vec::new());
            }

            let mut table = txn
                .open_table(StrTable::new(channel))
                .with_storage(|| format!("Failed to open channel '{channel}'"))?;

            let mut items = Vec::with_capacity(count);
            while items.len() < count {
                let entry = table
                    .pop_first()
                    .with_storage(|| format!("Failed to pop from channel '{channel}'"))?
                    .map(|(k, v)| (k.value().to_string(), v.value().to_string()));

                let Some((key, payload)) = entry else {
                    break;
                };
                items.push(
                    Item::new(channel, key)
                        .with_raw_payload(payload)
                        .to_string(),
                );
            }
            Ok(items)
        })
    }

    /// Number of items in a channel; 0 if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub fn count(&self, channel: &str) -> Result<u64> {
        if !is_channel_name(channel) {
            return Ok(0);
        }
        self.engine.read(|txn| channel_len(txn, channel))
    }

    /// Keys of a channel in pop order, as `channel.key` strings.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub fn list_keys(&self, channel: &str) -> Result<Vec<String>> {
        if !is_channel_name(channel) {
            return Ok(Vec::new());
        }

        self.engine.read(|txn| {
            let table = match txn.open_table(StrTable::new(channel)) {
                Ok(t) => t,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(Error::storage(format!("opening channel '{channel}'"), e)),
            };

            let mut keys = Vec::new();
            for entry in table.iter().storage("Failed to iterate channel")? {
                let (key, _) = entry.storage("Failed to read channel entry")?;
                keys.push(format!("{channel}.{}", key.value()));
            }
            Ok(keys)
        })
    }

    /// Every channel with its item count, reserved tables excluded.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub fn list_channels(&self) -> Result<BTreeMap<String, u64>> {
        self.engine.read(|txn| {
            let names: Vec<String> = txn
                .list_tables()
                .storage("Failed to list tables")?
                .map(|handle| handle.name().to_string())
                .filter(|name| !is_reserved(name))
                .collect();

            let mut channels = BTreeMap::new();
            for name in names {
                let len = channel_len(txn, &name)?;
                channels.insert(name, len);
            }
            Ok(channels)
        })
    }

    /// Removes one item. A bare key (no `.`) refers to `TEST_CHANNEL`.
    ///
    /// Returns whether the key was present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidItem`] for a malformed item and
    /// [`Error::ChannelNotFound`] if the channel doesn't exist.
    pub fn remove_item(&self, raw: &str) -> Result<bool> {
        let item = Item::parse_with_fallback(raw, FALLBACK_CHANNEL)?;

        self.engine.write(|txn| {
            if !write_table_exists(txn, item.channel())? {
                return Err(Error::channel_not_found(item.channel()));
            }

            let mut table = txn
                .open_table(StrTable::new(item.channel()))
                .with_storage(|| format!("Failed to open channel '{}'", item.channel()))?;
            let removed = table
                .remove(item.key())
                .with_storage(|| format!("Failed to remove key '{}'", item.key()))?
                .is_some();
            Ok(removed)
        })
    }

    /// Removes every item but keeps the channel. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`] if the channel doesn't exist.
    pub fn clear_channel(&self, channel: &str) -> Result<usize> {
        self.clear_guarded(None, channel)
    }

    /// Like [`clear_channel`](Self::clear_channel), but refuses inside the
    /// same transaction when `lock_key` is set in the lock table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelLocked`] if the flag is set and
    /// [`Error::ChannelNotFound`] if the channel doesn't exist.
    pub fn clear_channel_unless_locked(&self, lock_key: &str, channel: &str) -> Result<usize> {
        self.clear_guarded(Some(lock_key), channel)
    }

    fn clear_guarded(&self, lock_key: Option<&str>, channel: &str) -> Result<usize> {
        if !is_channel_name(channel) {
            return Err(Error::channel_not_found(channel));
        }

        self.engine.write(|txn| {
            ensure_unlocked(txn, lock_key, channel)?;
            if !write_table_exists(txn, channel)? {
                return Err(Error::channel_not_found(channel));
            }

            let mut table = txn
                .open_table(StrTable::new(channel))
                .with_storage(|| format!("Failed to open channel '{channel}'"))?;

            let mut keys = Vec::new();
            for entry in table.iter().storage("Failed to iterate channel")? {
                let (key, _) = entry.storage("Failed to read channel entry")?;
                keys.push(key.value().to_string());
            }
            for key in &keys {
                table
                    .remove(key.as_str())
                    .with_storage(|| format!("Failed to remove key '{key}'"))?;
            }
            Ok(keys.len())
        })
    }

    /// Drops the channel and all of its items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`] if the channel doesn't exist.
    pub fn delete_channel(&self, channel: &str) -> Result<()> {
        self.delete_guarded(None, channel)
    }

    /// Like [`delete_channel`](Self::delete_channel), but refuses inside the
    /// same transaction when `lock_key` is set in the lock table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelLocked`] if the flag is set and
    /// [`Error::ChannelNotFound`] if the channel doesn't exist.
    pub fn delete_channel_unless_locked(&self, lock_key: &str, channel: &str) -> Result<()> {
        self.delete_guarded(Some(lock_key), channel)
    }

    fn delete_guarded(&self, lock_key: Option<&str>, channel: &str) -> Result<()> {
        if !is_channel_name(channel) {
            return Err(Error::channel_not_found(channel));
        }

        self.engine.write(|txn| {
            ensure_unlocked(txn, lock_key, channel)?;
            let existed = txn
                .delete_table(StrTable::new(channel))
                .with_storage(|| format!("Failed to delete channel '{channel}'"))?;
            if existed {
                Ok(())
            } else {
                Err(Error::channel_not_found(channel))
            }
        })
    }

    // -------------------------------------------------------------------------
    // Reserved namespaces (flags, statistics, key/value)
    // -------------------------------------------------------------------------

    pub(crate) fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.engine.write(|txn| {
            let mut table = txn
                .open_table(StrTable::new(namespace))
                .with_storage(|| format!("Failed to open '{namespace}'"))?;
            table
                .insert(key, value)
                .with_storage(|| format!("Failed to insert key '{key}'"))?;
            Ok(())
        })
    }

    pub(crate) fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        self.engine.read(|txn| {
            let table = match txn.open_table(StrTable::new(namespace)) {
                Ok(t) => t,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(Error::storage(format!("opening '{namespace}'"), e)),
            };
            let value = table
                .get(key)
                .with_storage(|| format!("Failed to read key '{key}'"))?
                .map(|guard| guard.value().to_string());
            Ok(value)
        })
    }

    pub(crate) fn has(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.get(namespace, key)?.is_some())
    }

    pub(crate) fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        self.engine.write(|txn| {
            if !write_table_exists(txn, namespace)? {
                return Ok(false);
            }
            let mut table = txn
                .open_table(StrTable::new(namespace))
                .with_storage(|| format!("Failed to open '{namespace}'"))?;
            let removed = table
                .remove(key)
                .with_storage(|| format!("Failed to remove key '{key}'"))?
                .is_some();
            Ok(removed)
        })
    }

    /// Adds each delta to its counter in one transaction.
    pub(crate) fn increment_all(&self, namespace: &str, deltas: &BTreeMap<String, u64>) -> Result<()> {
        self.engine.write(|txn| {
            let mut table = txn
                .open_table(CounterTable::new(namespace))
                .with_storage(|| format!("Failed to open '{namespace}'"))?;
            for (key, delta) in deltas {
                let current = table
                    .get(key.as_str())
                    .with_storage(|| format!("Failed to read counter '{key}'"))?
                    .map_or(0, |guard| guard.value());
                table
                    .insert(key.as_str(), current.saturating_add(*delta))
                    .with_storage(|| format!("Failed to write counter '{key}'"))?;
            }
            Ok(())
        })
    }

    pub(crate) fn counters(&self, namespace: &str) -> Result<BTreeMap<String, u64>> {
        self.engine.read(|txn| {
            let table = match txn.open_table(CounterTable::new(namespace)) {
                Ok(t) => t,
                Err(redb::TableError::TableDoesNotExist(_)) => return Ok(BTreeMap::new()),
                Err(e) => return Err(Error::storage(format!("opening '{namespace}'"), e)),
            };

            let mut counters = BTreeMap::new();
            for entry in table.iter().storage("Failed to iterate counters")? {
                let (key, value) = entry.storage("Failed to read counter")?;
                counters.insert(key.value().to_string(), value.value());
            }
            Ok(counters)
        })
    }
}

fn channel_len(txn: &ReadTransaction, channel: &str) -> Result<u64> {
    match txn.open_table(StrTable::new(channel)) {
        Ok(table) => table
            .len()
            .with_storage(|| format!("Failed to count channel '{channel}'")),
        Err(redb::TableError::TableDoesNotExist(_)) => Ok(0),
        Err(e) => Err(Error::storage(format!("opening channel '{channel}'"), e)),
    }
}

/// Whether `key` is present in a flag table, read inside a write
/// transaction without creating the table.
fn flag_set(txn: &WriteTransaction, namespace: &str, key: &str) -> Result<bool> {
    if !write_table_exists(txn, namespace)? {
        return Ok(false);
    }
    let table = txn
        .open_table(StrTable::new(namespace))
        .with_storage(|| format!("Failed to open '{namespace}'"))?;
    let present = table
        .get(key)
        .with_storage(|| format!("Failed to read flag '{key}'"))?
        .is_some();
    Ok(present)
}

fn ensure_unlocked(txn: &WriteTransaction, lock_key: Option<&str>, channel: &str) -> Result<()> {
    if let Some(key) = lock_key
        && flag_set(txn, LOCK_TABLE, key)?
    {
        return Err(Error::channel_locked(channel));
    }
    Ok(())
}
