//! tinyq: a small multi-tenant work queue persisted with redb.
//!
//! Each application gets its own store file holding named channels of
//! `channel.key[.payload]` items. Items are popped in key order; channels
//! can be paused (no pops) or locked (no clear/delete), and every operation
//! feeds per-channel statistics through a bounded aggregator.
//!
//! The crate ships the server ([`daemon`]), an HTTP client with a polling
//! worker ([`client`]) and the item format shared by both ([`item`]).

pub mod client;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod error;
pub mod item;
pub mod protocol;

pub use error::{Error, Result};
pub use item::{Item, Payload};
