//! Queue manager: the async entry point used by the HTTP layer and the
//! in-process worker transport.
//!
//! Resolves the application's store through the registry, runs the store
//! operation on the blocking pool and records a statistics event once it
//! succeeds. Pause and lock flags are checked inside the operation's own
//! write transaction.

use std::path::PathBuf;
use tracing::{debug, info};

use crate::constants::{FALLBACK_CHANNEL, KV_TABLE};
use crate::daemon::registry::QueueRegistry;
use crate::daemon::services::queue::ChannelStore;
use crate::daemon::services::state::{
    ChannelInfo, ChannelStats, StatCommand, StateCoordinator, flag_key,
};
use crate::error::Result;
use crate::item::Item;

/// Async queue facade over the registry and state coordinator.
///
/// `QueueManager` is `Clone`; clones share stores and the aggregator.
#[derive(Clone)]
pub struct QueueManager {
    registry: QueueRegistry,
    state: StateCoordinator,
}

impl QueueManager {
    /// Creates a manager rooted at `root` with a statistics buffer of
    /// `stats_buffer` events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(root: impl Into<PathBuf>, stats_buffer: usize) -> Self {
        let registry = QueueRegistry::new(root);
        let state = StateCoordinator::new(registry.clone(), stats_buffer);
        info!(root = %registry.root().display(), stats_buffer, "Queue manager started");
        Self { registry, state }
    }

    pub fn registry(&self) -> &QueueRegistry {
        &self.registry
    }

    pub fn state(&self) -> &StateCoordinator {
        &self.state
    }

    async fn store(&self, application: &str) -> Result<ChannelStore> {
        let registry = self.registry.clone();
        let application = application.to_string();
        blocking(move || registry.get(&application)).await
    }

    /// Upserts an item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidItem`](crate::Error::InvalidItem) for a malformed item, or a storage error.
    pub async fn push(&self, application: &str, raw: &str) -> Result<Item> {
        let store = self.store(application).await?;
        let raw = raw.to_string();
        let item = blocking(move || store.push(&raw)).await?;

        debug!(application, channel = item.channel(), key = item.key(), "Pushed item");
        self.state
            .add_stat(application, StatCommand::Push, item.channel())
            .await;
        Ok(item)
    }

    /// Removes and returns up to `count` items (clamped to `1..=10`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelPaused`](crate::Error::ChannelPaused) if the channel is paused (nothing is
    /// removed), or a storage error.
    pub async fn pop(&self, application: &str, channel: &str, count: usize) -> Result<Vec<String>> {
        let store = self.store(application).await?;
        let (key, ch) = (flag_key(application, channel), channel.to_string());
        let items = blocking(move || store.pop_unless_paused(&key, &ch, count)).await?;

        for _ in &items {
            self.state.add_stat(application, StatCommand::Pop, channel).await;
        }
        Ok(items)
    }

    /// Removes one item by `channel.key` (or bare key in `TEST_CHANNEL`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if the channel doesn't exist.
    pub async fn remove_item(&self, application: &str, raw: &str) -> Result<bool> {
        let item = Item::parse_with_fallback(raw, FALLBACK_CHANNEL)?;
        let target = format!("{}.{}", item.channel(), item.key());

        let store = self.store(application).await?;
        let raw = raw.to_string();
        let removed = blocking(move || store.remove_item(&raw)).await?;

        self.state.add_stat(application, StatCommand::Ack, &target).await;
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub async fn count(&self, application: &str, channel: &str) -> Result<u64> {
        let store = self.store(application).await?;
        let ch = channel.to_string();
        blocking(move || store.count(&ch)).await
    }

    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub async fn list_keys(&self, application: &str, channel: &str) -> Result<Vec<String>> {
        let store = self.store(application).await?;
        let ch = channel.to_string();
        blocking(move || store.list_keys(&ch)).await
    }

    /// Every channel with its count and flags, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub async fn channels(&self, application: &str) -> Result<Vec<ChannelInfo>> {
        let store = self.store(application).await?;
        let state = self.state.clone();
        let app = application.to_string();

        let rows = blocking(move || {
            let mut rows = Vec::new();
            for (name, count) in store.list_channels()? {
                rows.push(ChannelInfo {
                    paused: state.is_channel_paused(&app, &name)?,
                    locked: state.is_channel_locked(&app, &name)?,
                    name,
                    count,
                });
            }
            Ok(rows)
        })
        .await?;

        self.state
            .add_stat(application, StatCommand::ChannelList, "")
            .await;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns an error if the flag cannot be written.
    pub async fn pause(&self, application: &str, channel: &str) -> Result<()> {
        let state = self.state.clone();
        let (app, ch) = (application.to_string(), channel.to_string());
        blocking(move || state.pause_channel(&app, &ch)).await?;

        info!(application, channel, "Channel paused");
        self.state
            .add_stat(application, StatCommand::ChannelPause, channel)
            .await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the flag cannot be written.
    pub async fn resume(&self, application: &str, channel: &str) -> Result<()> {
        let state = self.state.clone();
        let (app, ch) = (application.to_string(), channel.to_string());
        blocking(move || state.resume_channel(&app, &ch)).await?;

        info!(application, channel, "Channel resumed");
        self.state
            .add_stat(application, StatCommand::ChannelResume, channel)
            .await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the flag cannot be read.
    pub async fn is_paused(&self, application: &str, channel: &str) -> Result<bool> {
        let state = self.state.clone();
        let (app, ch) = (application.to_string(), channel.to_string());
        let paused = blocking(move || state.is_channel_paused(&app, &ch)).await?;

        self.state
            .add_stat(application, StatCommand::ChannelStatus, channel)
            .await;
        Ok(paused)
    }

    /// # Errors
    ///
    /// Returns an error if the flag cannot be written.
    pub async fn lock(&self, application: &str, channel: &str) -> Result<()> {
        let state = self.state.clone();
        let (app, ch) = (application.to_string(), channel.to_string());
        blocking(move || state.lock_channel(&app, &ch)).await?;

        info!(application, channel, "Channel locked");
        self.state
            .add_stat(application, StatCommand::LockChannel, channel)
            .await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the flag cannot be written.
    pub async fn unlock(&self, application: &str, channel: &str) -> Result<()> {
        let state = self.state.clone();
        let (app, ch) = (application.to_string(), channel.to_string());
        blocking(move || state.unlock_channel(&app, &ch)).await?;

        info!(application, channel, "Channel unlocked");
        self.state
            .add_stat(application, StatCommand::UnlockChannel, channel)
            .await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the flag cannot be read.
    pub async fn is_locked(&self, application: &str, channel: &str) -> Result<bool> {
        let state = self.state.clone();
        let (app, ch) = (application.to_string(), channel.to_string());
        let locked = blocking(move || state.is_channel_locked(&app, &ch)).await?;

        self.state
            .add_stat(application, StatCommand::LockStatus, channel)
            .await;
        Ok(locked)
    }

    /// Empties a channel. Returns the number of items removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelLocked`](crate::Error::ChannelLocked) if the channel is locked and
    /// [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if it doesn't exist.
    pub async fn clear(&self, application: &str, channel: &str) -> Result<usize> {
        let store = self.store(application).await?;
        let (key, ch) = (flag_key(application, channel), channel.to_string());
        let removed = blocking(move || store.clear_channel_unless_locked(&key, &ch)).await?;

        info!(application, channel, removed, "Channel cleared");
        self.state
            .add_stat(application, StatCommand::ClearChannel, channel)
            .await;
        Ok(removed)
    }

    /// Drops a channel and its items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelLocked`](crate::Error::ChannelLocked) if the channel is locked and
    /// [`Error::ChannelNotFound`](crate::Error::ChannelNotFound) if it doesn't exist.
    pub async fn delete(&self, application: &str, channel: &str) -> Result<()> {
        let store = self.store(application).await?;
        let (key, ch) = (flag_key(application, channel), channel.to_string());
        blocking(move || store.delete_channel_unless_locked(&key, &ch)).await?;

        info!(application, channel, "Channel deleted");
        self.state
            .add_stat(application, StatCommand::DeleteChannel, channel)
            .await;
        Ok(())
    }

    /// Per-channel statistics, sorted by channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn stats(&self, application: &str) -> Result<Vec<ChannelStats>> {
        let state = self.state.clone();
        let app = application.to_string();
        blocking(move || state.stats(&app)).await
    }

    /// Every known application name.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be read.
    pub async fn applications(&self) -> Result<Vec<String>> {
        let registry = self.registry.clone();
        blocking(move || registry.applications()).await
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn kv_set(&self, application: &str, key: &str, value: &str) -> Result<()> {
        let store = self.store(application).await?;
        let (key, value) = (key.to_string(), value.to_string());
        blocking(move || store.set(KV_TABLE, &key, &value)).await
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn kv_get(&self, application: &str, key: &str) -> Result<Option<String>> {
        let store = self.store(application).await?;
        let key = key.to_string();
        blocking(move || store.get(KV_TABLE, &key)).await
    }

    /// Returns whether the key existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn kv_delete(&self, application: &str, key: &str) -> Result<bool> {
        let store = self.store(application).await?;
        let key = key.to_string();
        blocking(move || store.delete(KV_TABLE, &key)).await
    }

    /// Drains pending statistics, then closes every store.
    pub async fn shutdown(&self) {
        self.state.shutdown().await;
        let registry = self.registry.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || registry.close_all()).await {
            tracing::warn!(error = %e, "Failed to close stores");
        }
    }
}

/// Runs a blocking redb operation off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
