//! Persistent channel queues backed by redb.
//!
//! One [`StorageEngine`] per application file; [`ChannelStore`] layers the
//! queue operations on top of it.
//!
//! # Examples
//!
//! ```rust
//! use tinyq::daemon::services::queue::{ChannelStore, StorageEngine};
//!
//! # fn main() -> tinyq::Result<()> {
//! # let temp_dir = tempfile::tempdir().unwrap();
//! let engine = StorageEngine::open(temp_dir.path().join("shop.redb"))?;
//! let store = ChannelStore::new(engine);
//!
//! store.push("orders.0002")?;
//! store.push("orders.0001")?;
//!
//! // Pops follow key order, not insertion order
//! assert_eq!(store.pop("orders", 1)?, vec!["orders.0001".to_string()]);
//! assert_eq!(store.count("orders")?, 1);
//! # Ok(())
//! # }
//! ```

mod engine;
mod service;

pub use engine::StorageEngine;
pub use service::{ChannelStore, clamp_pop_count, is_reserved};
