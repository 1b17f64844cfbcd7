//! Shared constants.

/// Default HTTP port for `tinyq serve`.
pub const DEFAULT_PORT: u16 = 8080;

/// Application used when a request does not name one.
pub const DEFAULT_APPLICATION: &str = "default";

/// Capacity of the statistics buffer between producers and the aggregator.
pub const DEFAULT_STATS_BUFFER: usize = 100;

/// Upper bound on items removed by a single pop.
pub const MAX_POP_COUNT: usize = 10;

/// Channel assumed by `remove_item` when the item has no channel field.
pub const FALLBACK_CHANNEL: &str = "TEST_CHANNEL";

/// Prefix of table names that hold engine state rather than channel data.
pub const RESERVED_PREFIX: &str = "internal:";

/// Table holding pause flags keyed `application:channel`.
pub const PAUSE_TABLE: &str = "internal:pause";

/// Table holding lock flags keyed `application:channel`.
pub const LOCK_TABLE: &str = "internal:locks";

/// Table holding statistics counters keyed `command:target`.
pub const STATS_TABLE: &str = "internal:stats";

/// Table backing the `crud` key/value endpoint.
pub const KV_TABLE: &str = "internal:kv";

/// File extension of application stores.
pub const STORE_EXTENSION: &str = "redb";

/// Default worker backoff when a pop yields nothing, in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 2000;

/// Default server URL for clients.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Envelope messages with special meaning to clients.
pub const MSG_OK: &str = "ok";
pub const MSG_EMPTY: &str = "empty";
pub const MSG_PAUSED: &str = "paused";
pub const MSG_LOCKED: &str = "locked";
pub const MSG_ERROR: &str = "error";
