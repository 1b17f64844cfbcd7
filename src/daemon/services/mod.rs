//! Engine services: channel queues and channel state.

pub mod queue;
pub mod state;
