//! Channel state: pause and lock flags plus usage statistics.
//!
//! Pause blocks pops only. Lock blocks clear and delete only. Both are
//! presence flags keyed `application:channel` in reserved tables of the
//! application's store, so they survive restarts.

mod coordinator;
mod types;

pub use coordinator::{StateCoordinator, flag_key};
pub use types::{ChannelInfo, ChannelStats, StatCommand, StatEvent};
