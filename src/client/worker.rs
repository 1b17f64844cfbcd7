//! Polling worker loop.
//!
//! A worker takes one item at a time from a channel, hands it to an
//! [`ItemHandler`] and pushes whatever the handler returns as the next
//! item. Delivery is at-most-once: the item left the channel when it was
//! popped, so a failing handler loses it.

use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::context::WorkerContext;
use super::transport::{PopOutcome, QueueTransport};
use crate::item::Item;

/// Where a worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Between polls, or backing off.
    Idle,
    /// Waiting for a pop response.
    Polling,
    /// Running the handler.
    Processing,
    /// Loop has exited.
    Stopped,
}

/// Processes one item.
///
/// `Ok(Some(item))` is pushed as a new item, `Ok(None)` ends the chain and
/// `Err` is logged. Closures `Fn(WorkerContext) -> impl Future` implement
/// this trait.
#[async_trait]
pub trait ItemHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: WorkerContext) -> anyhow::Result<Option<String>>;
}

#[async_trait]
impl<F, Fut> ItemHandler for F
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send + 'static,
{
    async fn handle(&self, ctx: WorkerContext) -> anyhow::Result<Option<String>> {
        (self)(ctx).await
    }
}

/// Counters returned when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Items handed to the handler.
    pub processed: u64,
    /// Items whose handler failed or panicked, or that didn't parse.
    pub failed: u64,
    /// Follow-up items pushed successfully.
    pub chained: u64,
}

/// Worker bound to one channel.
pub struct Worker {
    transport: Arc<dyn QueueTransport>,
    channel: String,
    backoff: Duration,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        channel: impl Into<String>,
        backoff: Duration,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            transport,
            channel: channel.into(),
            backoff,
            state,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver that observes state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Runs until `cancel` fires.
    ///
    /// Cancellation is checked between iterations and during backoff; an
    /// in-flight pop, handler call or push always completes first.
    pub async fn run<H: ItemHandler>(&self, handler: H, cancel: CancellationToken) -> WorkerSummary {
        info!(channel = %self.channel, "Worker started");
        let mut summary = WorkerSummary::default();

        while !cancel.is_cancelled() {
            self.state.send_replace(WorkerState::Polling);

            let raw = match self.transport.pop(&self.channel).await {
                Ok(PopOutcome::Item(raw)) => raw,
                Ok(PopOutcome::Empty) => {
                    self.back_off(&cancel).await;
                    continue;
                },
                Ok(PopOutcome::Paused) => {
                    debug!(channel = %self.channel, "Channel paused");
                    self.back_off(&cancel).await;
                    continue;
                },
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "Pop failed");
                    self.back_off(&cancel).await;
                    continue;
                },
            };

            self.state.send_replace(WorkerState::Processing);
            self.process(&handler, &raw, &mut summary).await;
            self.state.send_replace(WorkerState::Idle);
        }

        self.state.send_replace(WorkerState::Stopped);
        info!(
            channel = %self.channel,
            processed = summary.processed,
            failed = summary.failed,
            chained = summary.chained,
            "Worker stopped"
        );
        summary
    }

    async fn back_off(&self, cancel: &CancellationToken) {
        self.state.send_replace(WorkerState::Idle);
        tokio::select! {
            () = cancel.cancelled() => {},
            () = tokio::time::sleep(self.backoff) => {},
        }
    }

    async fn process<H: ItemHandler>(&self, handler: &H, raw: &str, summary: &mut WorkerSummary) {
        let item: Item = match raw.parse() {
            Ok(item) => item,
            Err(e) => {
                warn!(channel = %self.channel, item = raw, error = %e, "Discarding malformed item");
                summary.failed += 1;
                return;
            },
        };
        summary.processed += 1;

        let key = item.key().to_string();
        let ctx = WorkerContext::new(item, Arc::clone(&self.transport));

        match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
            Ok(Ok(Some(next))) if !next.is_empty() => match self.transport.push(&next).await {
                Ok(()) => {
                    debug!(channel = %self.channel, key = %key, next = %next, "Chained item");
                    summary.chained += 1;
                },
                Err(e) => {
                    warn!(channel = %self.channel, key = %key, next = %next, error = %e, "Failed to push follow-up item");
                },
            },
            Ok(Ok(_)) => {
                debug!(channel = %self.channel, key = %key, "Item processed");
            },
            Ok(Err(e)) => {
                warn!(channel = %self.channel, key = %key, error = %e, "Handler failed");
                summary.failed += 1;
            },
            Err(_) => {
                error!(channel = %self.channel, key = %key, "Handler panicked");
                summary.failed += 1;
            },
        }
    }
}
