//! Transport trait for the worker loop.
//!
//! Lets the same worker run against a remote server ([`WebClient`]) or an
//! in-process [`QueueManager`] ([`LocalTransport`]).
//!
//! [`WebClient`]: super::WebClient

use async_trait::async_trait;

use crate::daemon::manager::QueueManager;
use crate::error::{Error, Result};

/// Result of asking for the next item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopOutcome {
    /// An item string, already removed from the channel.
    Item(String),
    /// The channel has no items (or doesn't exist).
    Empty,
    /// The channel is paused.
    Paused,
}

/// Pop and push access to one application's channels.
///
/// All transports must be thread-safe (`Send + Sync`) for use with tokio.
#[async_trait]
pub trait QueueTransport: Send + Sync + 'static {
    /// Removes and returns the next item of `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport or the engine fails.
    async fn pop(&self, channel: &str) -> Result<PopOutcome>;

    /// Enqueues an item string.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is rejected or the transport fails.
    async fn push(&self, item: &str) -> Result<()>;
}

/// In-process transport over a [`QueueManager`].
#[derive(Clone)]
pub struct LocalTransport {
    manager: QueueManager,
    application: String,
}

impl LocalTransport {
    pub fn new(manager: QueueManager, application: impl Into<String>) -> Self {
        Self {
            manager,
            application: application.into(),
        }
    }
}

#[async_trait]
impl QueueTransport for LocalTransport {
    async fn pop(&self, channel: &str) -> Result<PopOutcome> {
        match self.manager.pop(&self.application, channel, 1).await {
            Ok(items) => Ok(items
                .into_iter()
                .next()
                .map_or(PopOutcome::Empty, PopOutcome::Item)),
            Err(Error::ChannelPaused { .. }) => Ok(PopOutcome::Paused),
            Err(e) => Err(e),
        }
    }

    async fn push(&self, item: &str) -> Result<()> {
        self.manager.push(&self.application, item).await.map(|_| ())
    }
}
