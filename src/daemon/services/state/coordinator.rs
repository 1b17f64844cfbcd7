//! Pause/lock flags and the statistics aggregator.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{ChannelStats, StatCommand, StatEvent};
use crate::constants::{LOCK_TABLE, PAUSE_TABLE, STATS_TABLE};
use crate::daemon::registry::QueueRegistry;
use crate::error::Result;

/// Most events the aggregator folds into one round of transactions.
const AGGREGATOR_BATCH: usize = 64;

const PAUSED: &str = "paused";
const LOCKED: &str = "locked";

/// Flag key for a channel: `application:channel`.
pub fn flag_key(application: &str, channel: &str) -> String {
    format!("{application}:{channel}")
}

struct CoordinatorInner {
    registry: QueueRegistry,
    sender: Mutex<Option<mpsc::Sender<StatEvent>>>,
    aggregator: Mutex<Option<JoinHandle<()>>>,
}

/// Channel pause/lock state and usage statistics.
///
/// Flags live in reserved tables of each application's own store.
/// Statistics go through a bounded buffer drained by exactly one
/// background task, so counter updates never race each other.
///
/// `StateCoordinator` is `Clone`; clones share the buffer and aggregator.
#[derive(Clone)]
pub struct StateCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl StateCoordinator {
    /// Creates the coordinator and spawns its aggregator task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(registry: QueueRegistry, buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let aggregator = tokio::spawn(run_aggregator(registry.clone(), receiver));

        Self {
            inner: Arc::new(CoordinatorInner {
                registry,
                sender: Mutex::new(Some(sender)),
                aggregator: Mutex::new(Some(aggregator)),
            }),
        }
    }

    /// Marks a channel paused. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the application store cannot be opened or written.
    pub fn pause_channel(&self, application: &str, channel: &str) -> Result<()> {
        self.inner
            .registry
            .get(application)?
            .set(PAUSE_TABLE, &flag_key(application, channel), PAUSED)
    }

    /// Clears the pause flag. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the application store cannot be opened or written.
    pub fn resume_channel(&self, application: &str, channel: &str) -> Result<()> {
        self.inner
            .registry
            .get(application)?
            .delete(PAUSE_TABLE, &flag_key(application, channel))
            .map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the application store cannot be opened or read.
    pub fn is_channel_paused(&self, application: &str, channel: &str) -> Result<bool> {
        self.inner
            .registry
            .get(application)?
            .has(PAUSE_TABLE, &flag_key(application, channel))
    }

    /// Marks a channel locked. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the application store cannot be opened or written.
    pub fn lock_channel(&self, application: &str, channel: &str) -> Result<()> {
        self.inner
            .registry
            .get(application)?
            .set(LOCK_TABLE, &flag_key(application, channel), LOCKED)
    }

    /// Clears the lock flag. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the application store cannot be opened or written.
    pub fn unlock_channel(&self, application: &str, channel: &str) -> Result<()> {
        self.inner
            .registry
            .get(application)?
            .delete(LOCK_TABLE, &flag_key(application, channel))
            .map(|_| ())
    }

    /// # Errors
    ///
    /// Returns an error if the application store cannot be opened or read.
    pub fn is_channel_locked(&self, application: &str, channel: &str) -> Result<bool> {
        self.inner
            .registry
            .get(application)?
            .has(LOCK_TABLE, &flag_key(application, channel))
    }

    /// Queues a statistics event.
    ///
    /// Waits only while the buffer is full. Events sent after
    /// [`shutdown`](Self::shutdown) are dropped.
    pub async fn add_stat(&self, application: &str, command: StatCommand, target: &str) {
        let sender = self.inner.sender.lock().clone();
        let Some(sender) = sender else {
            debug!(application, %command, "Statistics buffer closed, event dropped");
            return;
        };

        let event = StatEvent {
            application: application.to_string(),
            command,
            target: target.to_string(),
        };
        if sender.send(event).await.is_err() {
            debug!(application, %command, "Statistics aggregator stopped, event dropped");
        }
    }

    /// One record per live channel, sorted by channel name.
    ///
    /// A counter belongs to a channel when its target is the channel name
    /// or an item string in that channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the application store cannot be opened or read.
    pub fn stats(&self, application: &str) -> Result<Vec<ChannelStats>> {
        let store = self.inner.registry.get(application)?;
        let channels = store.list_channels()?;
        let counters = store.counters(STATS_TABLE)?;

        let mut records = Vec::with_capacity(channels.len());
        for (channel, count) in channels {
            let is_paused = store.has(PAUSE_TABLE, &flag_key(application, &channel))?;

            let mut stats = BTreeMap::new();
            for (key, n) in &counters {
                if let Some((command, target)) = key.split_once(':')
                    && target.split('.').next() == Some(channel.as_str())
                {
                    *stats.entry(command.to_string()).or_insert(0) += n;
                }
            }

            records.push(ChannelStats {
                channel,
                stats,
                is_paused,
                count,
            });
        }

        Ok(records)
    }

    /// Closes the buffer and waits for the aggregator to apply what is left.
    pub async fn shutdown(&self) {
        drop(self.inner.sender.lock().take());

        let handle = self.inner.aggregator.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Statistics aggregator ended abnormally");
        }
    }
}

async fn run_aggregator(registry: QueueRegistry, mut receiver: mpsc::Receiver<StatEvent>) {
    debug!("Statistics aggregator started");
    let mut batch = Vec::with_capacity(AGGREGATOR_BATCH);

    while receiver.recv_many(&mut batch, AGGREGATOR_BATCH).await > 0 {
        let grouped = group_by_application(batch.drain(..));
        let registry = registry.clone();

        if let Err(e) = tokio::task::spawn_blocking(move || apply(&registry, grouped)).await {
            warn!(error = %e, "Statistics batch panicked");
        }
    }

    debug!("Statistics aggregator stopped");
}

fn group_by_application(
    events: impl Iterator<Item = StatEvent>,
) -> BTreeMap<String, BTreeMap<String, u64>> {
    let mut grouped: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for event in events {
        *grouped
            .entry(event.application.clone())
            .or_default()
            .entry(event.counter_key())
            .or_insert(0) += 1;
    }
    grouped
}

/// Counters go only to stores that are still open; events for a detached
/// application are dropped rather than reopening its file.
fn apply(registry: &QueueRegistry, grouped: BTreeMap<String, BTreeMap<String, u64>>) {
    for (application, deltas) in grouped {
        let Some(store) = registry.get_open(&application) else {
            debug!(
                application = %application,
                events = deltas.values().sum::<u64>(),
                "Application not open, statistics dropped"
            );
            continue;
        };
        let result = store.increment_all(STATS_TABLE, &deltas);

        if let Err(e) = result {
            warn!(
                application = %application,
                events = deltas.values().sum::<u64>(),
                error = %e,
                "Failed to record statistics"
            );
        }
    }
}
