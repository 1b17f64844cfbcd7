//! Item wire grammar and payload codec.
//!
//! An item travels as `channel.key` or `channel.key.payload`, where the
//! payload is standard base64 (padded) of a JSON object of string pairs.
//! The base64 alphabet contains no `.`, so the three fields split cleanly.
//!
//! # Examples
//!
//! ```rust
//! use tinyq::item::{Item, Payload};
//!
//! # fn main() -> tinyq::Result<()> {
//! let mut payload = Payload::default();
//! payload.set("user", "42");
//!
//! let item = Item::new("orders", "1001").with_payload(&payload)?;
//! let parsed: Item = item.to_string().parse()?;
//! assert_eq!(parsed.channel(), "orders");
//! assert_eq!(parsed.payload()?.get("user"), Some("42"));
//! # Ok(())
//! # }
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::RESERVED_PREFIX;
use crate::error::{Error, Result};

/// A unit of work addressed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    channel: String,
    key: String,
    payload: Option<String>,
}

impl Item {
    /// Build an item without payload.
    pub fn new(channel: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            key: key.into(),
            payload: None,
        }
    }

    /// Build an item whose key sorts after every key generated earlier by
    /// this process (nanosecond timestamp plus a random suffix).
    ///
    /// Pop order is byte-lexicographic on keys, so producers that want
    /// arrival order should use this (or their own monotonic keys).
    pub fn sequential(channel: impl Into<String>) -> Self {
        let nanos = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .max(0);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::new(channel, format!("{nanos:020}{}", &suffix[..8]))
    }

    /// Attach an encoded payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Payload`] if the map cannot be serialized.
    pub fn with_payload(mut self, payload: &Payload) -> Result<Self> {
        self.payload = if payload.is_empty() {
            None
        } else {
            Some(payload.encode()?)
        };
        Ok(self)
    }

    /// Attach an already encoded payload string.
    pub fn with_raw_payload(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        self.payload = (!raw.is_empty()).then_some(raw);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Encoded payload as stored, if any.
    pub fn raw_payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Decode the payload. An item without payload decodes to an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Payload`] on invalid base64 or JSON.
    pub fn payload(&self) -> Result<Payload> {
        match &self.payload {
            Some(raw) => Payload::decode(raw),
            None => Ok(Payload::default()),
        }
    }

    /// Parse `channel.key[.payload]`, falling back to `fallback_channel`
    /// when the string has no `.` at all.
    pub(crate) fn parse_with_fallback(s: &str, fallback_channel: &str) -> Result<Self> {
        if s.contains('.') {
            s.parse()
        } else {
            Self::validated(s, fallback_channel, s, None)
        }
    }

    fn validated(raw: &str, channel: &str, key: &str, payload: Option<&str>) -> Result<Self> {
        if channel.is_empty() {
            return Err(Error::invalid_item(raw, "empty channel"));
        }
        if key.is_empty() {
            return Err(Error::invalid_item(raw, "empty key"));
        }
        if channel.starts_with(RESERVED_PREFIX) {
            return Err(Error::invalid_item(raw, "reserved channel name"));
        }
        Ok(Self {
            channel: channel.to_string(),
            key: key.to_string(),
            payload: payload.filter(|p| !p.is_empty()).map(str::to_string),
        })
    }
}

impl FromStr for Item {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '.');
        let channel = parts.next().unwrap_or_default();
        let key = parts.next().unwrap_or_default();
        let payload = parts.next();

        if payload.is_some_and(|p| p.contains('.')) {
            return Err(Error::invalid_item(s, "too many fields"));
        }
        Self::validated(s, channel, key, payload)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.channel, self.key)?;
        if let Some(payload) = &self.payload {
            write!(f, ".{payload}")?;
        }
        Ok(())
    }
}

/// String map carried inside an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, String>);

impl Payload {
    /// Encode as base64 of the JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Payload`] if JSON serialization fails.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(&self.0)
            .map_err(|e| Error::Payload(format!("failed to serialize payload: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    /// Decode base64 JSON. An empty string decodes to an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Payload`] on invalid base64 or JSON.
    pub fn decode(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let bytes = STANDARD
            .decode(raw)
            .map_err(|e| Error::Payload(format!("invalid base64: {e}")))?;
        let map = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Payload(format!("invalid JSON: {e}")))?;
        Ok(Self(map))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_without_payload() {
        let item: Item = "orders.1001".parse().unwrap();
        assert_eq!(item.channel(), "orders");
        assert_eq!(item.key(), "1001");
        assert_eq!(item.raw_payload(), None);
        assert_eq!(item.to_string(), "orders.1001");
    }

    #[test]
    fn test_parse_rejects_empty_fields() {
        for raw in ["", ".1001", "orders.", "orders", "."] {
            let err = raw.parse::<Item>().unwrap_err();
            assert!(
                matches!(err, Error::InvalidItem { .. }),
                "expected InvalidItem for {raw:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_extra_fields() {
        let err = "a.b.c.d".parse::<Item>().unwrap_err();
        assert!(err.to_string().contains("too many fields"));
    }

    #[test]
    fn test_parse_rejects_reserved_channel() {
        let err = "internal:stats.k".parse::<Item>().unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_trailing_empty_payload_is_dropped() {
        let item: Item = "orders.1001.".parse().unwrap();
        assert_eq!(item.raw_payload(), None);
        assert_eq!(item.to_string(), "orders.1001");
    }

    #[test]
    fn test_fallback_channel_for_bare_key() {
        let item = Item::parse_with_fallback("1001", "TEST_CHANNEL").unwrap();
        assert_eq!(item.channel(), "TEST_CHANNEL");
        assert_eq!(item.key(), "1001");

        let item = Item::parse_with_fallback("orders.1001", "TEST_CHANNEL").unwrap();
        assert_eq!(item.channel(), "orders");
    }

    #[test]
    fn test_payload_decode_known_value() {
        // base64 of {"a":"1"}
        let payload = Payload::decode("eyJhIjoiMSJ9").unwrap();
        assert_eq!(payload.get("a"), Some("1"));
        assert_eq!(payload.encode().unwrap(), "eyJhIjoiMSJ9");
    }

    #[test]
    fn test_payload_decode_rejects_garbage() {
        assert!(Payload::decode("!!!").is_err());
        // valid base64, not a JSON object
        assert!(Payload::decode("bm90IGpzb24=").is_err());
        assert!(Payload::decode("").unwrap().is_empty());
    }

    #[test]
    fn test_sequential_keys_sort_in_creation_order() {
        let first = Item::sequential("jobs");
        std::thread::sleep(std::time::Duration::from_millis(1));
        let second = Item::sequential("jobs");
        assert!(first.key() < second.key());
        assert_eq!(first.channel(), "jobs");
    }

    proptest! {
        #[test]
        fn prop_item_round_trips(
            channel in "[a-z][a-z0-9_-]{0,15}",
            key in "[A-Za-z0-9_-]{1,24}",
            pairs in proptest::collection::btree_map("[a-z]{1,8}", "[ -~]{0,16}", 0..4),
        ) {
            let payload: Payload = pairs.into_iter().collect();
            let item = Item::new(channel.clone(), key.clone()).with_payload(&payload).unwrap();
            let parsed: Item = item.to_string().parse().unwrap();

            prop_assert_eq!(parsed.channel(), channel.as_str());
            prop_assert_eq!(parsed.key(), key.as_str());
            prop_assert_eq!(parsed.payload().unwrap(), payload);
        }
    }
}
