//! Server side of tinyq.
//!
//! - [`registry`] - one store per application, opened on first use
//! - [`services`] - channel storage and pause/lock/statistics state
//! - [`manager`] - async facade used by HTTP handlers and local workers
//! - [`http`] - axum router and `serve`
//! - [`paths`] - `~/.tinyq` layout

pub mod http;
pub mod manager;
pub mod paths;
pub mod registry;
pub mod services;
