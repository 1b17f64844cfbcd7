//! Per-item context handed to worker handlers.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use super::transport::QueueTransport;
use crate::error::Result;
use crate::item::{Item, Payload};

/// Values accepted as `true` by [`WorkerContext::get_bool`], compared
/// case-insensitively.
const TRUTHY: [&str; 5] = ["true", "1", "yes", "on", "enabled"];

/// The item being processed, its decoded payload and a handle for pushing
/// follow-up items.
///
/// Payload edits made through the setters travel with
/// [`route_to`](Self::route_to), so a handler can enrich the data before
/// passing it to the next stage.
pub struct WorkerContext {
    item: Item,
    data: Payload,
    transport: Arc<dyn QueueTransport>,
}

impl WorkerContext {
    /// An undecodable payload is logged and replaced by an empty map.
    pub fn new(item: Item, transport: Arc<dyn QueueTransport>) -> Self {
        let data = item.payload().unwrap_or_else(|e| {
            warn!(channel = item.channel(), key = item.key(), error = %e, "Ignoring undecodable payload");
            Payload::default()
        });
        Self {
            item,
            data,
            transport,
        }
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    /// Item key.
    pub fn id(&self) -> &str {
        self.item.key()
    }

    pub fn channel(&self) -> &str {
        self.item.channel()
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Payload {
        &mut self.data
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key)
    }

    /// Parses a payload value; `None` if missing or unparsable.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.data.get(key)?.trim().parse().ok()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get_parsed(key)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get_parsed(key)
    }

    /// `true` for "true", "1", "yes", "on" or "enabled"; `false` otherwise,
    /// including when the key is missing.
    pub fn get_bool(&self, key: &str) -> bool {
        self.data
            .get(key)
            .is_some_and(|v| TRUTHY.iter().any(|t| v.trim().eq_ignore_ascii_case(t)))
    }

    /// Reads a Unix timestamp in seconds.
    pub fn get_time(&self, key: &str) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.get_int(key)?, 0)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.data.set(key, value);
    }

    /// Stores a timestamp as Unix seconds.
    pub fn set_time(&mut self, key: impl Into<String>, time: DateTime<Utc>) {
        self.data.set(key, time.timestamp());
    }

    /// Sets several values at once.
    pub fn set_props<K, V, I>(&mut self, props: I)
    where
        K: Into<String>,
        V: ToString,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in props {
            self.data.set(key, value);
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Builds `channel.<id>[.payload]` from this item's id and current data.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn route_to(&self, channel: &str) -> Result<String> {
        Ok(Item::new(channel, self.id())
            .with_payload(&self.data)?
            .to_string())
    }

    /// Pushes an extra item besides the handler's return value.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is rejected or the transport fails.
    pub async fn push(&self, item: &str) -> Result<()> {
        self.transport.push(item).await
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("item", &self.item)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}
