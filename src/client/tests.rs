//! Tests for the worker loop and context, run over the in-process transport.

use super::*;
use crate::daemon::manager::QueueManager;
use crate::error::{Error, Result};
use crate::item::{Item, Payload};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

type Handled = anyhow::Result<Option<String>>;

/// Scripted transport: serves queued outcomes, records pushes.
#[derive(Default)]
struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<PopOutcome>>>,
    pushed: Mutex<Vec<String>>,
    pops: AtomicUsize,
}

impl ScriptedTransport {
    fn with(outcomes: Vec<Result<PopOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        })
    }
}

#[async_trait]
impl QueueTransport for ScriptedTransport {
    async fn pop(&self, _channel: &str) -> Result<PopOutcome> {
        self.pops.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or(Ok(PopOutcome::Empty))
    }

    async fn push(&self, item: &str) -> Result<()> {
        self.pushed.lock().push(item.to_string());
        Ok(())
    }
}

fn context(raw: &str) -> WorkerContext {
    WorkerContext::new(raw.parse().unwrap(), ScriptedTransport::with(vec![]))
}

/// Runs the worker until `done` returns true, then cancels it.
async fn run_until<H, F>(worker: &Worker, handler: H, done: F) -> WorkerSummary
where
    H: ItemHandler,
    F: Fn() -> bool,
{
    let cancel = CancellationToken::new();
    let run = worker.run(handler, cancel.clone());
    tokio::pin!(run);

    timeout(Duration::from_secs(10), async {
        loop {
            tokio::select! {
                summary = &mut run => return summary,
                () = tokio::time::sleep(Duration::from_millis(5)) => {
                    if done() {
                        cancel.cancel();
                    }
                },
            }
        }
    })
    .await
    .expect("worker did not stop")
}

#[tokio::test]
async fn test_handler_result_is_chained() {
    let transport = ScriptedTransport::with(vec![Ok(PopOutcome::Item("orders.1".to_string()))]);
    let worker = Worker::new(transport.clone(), "orders", Duration::from_millis(10));

    let summary = run_until(
        &worker,
        |ctx: WorkerContext| async move { Handled::Ok(Some(ctx.route_to("billing")?)) },
        || !transport.pushed.lock().is_empty(),
    )
    .await;

    assert_eq!(*transport.pushed.lock(), vec!["billing.1"]);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.chained, 1);
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn test_empty_result_is_not_pushed() {
    let transport = ScriptedTransport::with(vec![Ok(PopOutcome::Item("orders.1".to_string()))]);
    let worker = Worker::new(transport.clone(), "orders", Duration::from_millis(10));
    let seen = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&seen);
    let summary = run_until(
        &worker,
        move |_ctx: WorkerContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Handled::Ok(Some(String::new()))
            }
        },
        || seen.load(Ordering::SeqCst) == 1,
    )
    .await;

    assert!(transport.pushed.lock().is_empty());
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.chained, 0);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_loop() {
    let transport = ScriptedTransport::with(vec![
        Ok(PopOutcome::Item("jobs.1".to_string())),
        Ok(PopOutcome::Item("jobs.2".to_string())),
    ]);
    let worker = Worker::new(transport.clone(), "jobs", Duration::from_millis(10));
    let seen = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&seen);
    let summary = run_until(
        &worker,
        move |ctx: WorkerContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if ctx.id() == "1" {
                    anyhow::bail!("cannot process {}", ctx.id());
                }
                Handled::Ok(None)
            }
        },
        || seen.load(Ordering::SeqCst) == 2,
    )
    .await;

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert!(transport.pushed.lock().is_empty());
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let transport = ScriptedTransport::with(vec![
        Ok(PopOutcome::Item("jobs.boom".to_string())),
        Ok(PopOutcome::Item("jobs.fine".to_string())),
    ]);
    let worker = Worker::new(transport.clone(), "jobs", Duration::from_millis(10));

    let summary = run_until(
        &worker,
        |ctx: WorkerContext| async move {
            assert_ne!(ctx.id(), "boom", "handler exploded");
            Handled::Ok(Some(ctx.route_to("done")?))
        },
        || !transport.pushed.lock().is_empty(),
    )
    .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(*transport.pushed.lock(), vec!["done.fine"]);
}

#[tokio::test]
async fn test_errors_and_pauses_back_off() {
    let transport = ScriptedTransport::with(vec![
        Err(Error::Http("connection refused".to_string())),
        Ok(PopOutcome::Paused),
        Ok(PopOutcome::Item("jobs.1".to_string())),
    ]);
    let worker = Worker::new(transport.clone(), "jobs", Duration::from_millis(10));

    let summary = run_until(
        &worker,
        |_ctx: WorkerContext| async move { Handled::Ok(None) },
        || transport.pops.load(Ordering::SeqCst) >= 4,
    )
    .await;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_malformed_item_counts_as_failure() {
    let transport = ScriptedTransport::with(vec![Ok(PopOutcome::Item("no-key".to_string()))]);
    let worker = Worker::new(transport.clone(), "jobs", Duration::from_millis(10));

    let summary = run_until(
        &worker,
        |_ctx: WorkerContext| async move { Handled::Ok(None) },
        || transport.pops.load(Ordering::SeqCst) >= 2,
    )
    .await;

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff() {
    let transport = ScriptedTransport::with(vec![]);
    let worker = Worker::new(transport, "jobs", Duration::from_secs(3600));
    let cancel = CancellationToken::new();
    let mut states = worker.subscribe();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.cancel();
    });

    let summary = timeout(
        Duration::from_secs(5),
        worker.run(|_ctx: WorkerContext| async move { Handled::Ok(None) }, cancel),
    )
    .await
    .expect("cancellation should end the backoff");

    assert_eq!(summary, WorkerSummary::default());
    assert_eq!(*states.borrow_and_update(), WorkerState::Stopped);
}

#[tokio::test]
async fn test_already_cancelled_worker_never_polls() {
    let transport = ScriptedTransport::with(vec![Ok(PopOutcome::Item("jobs.1".to_string()))]);
    let worker = Worker::new(transport.clone(), "jobs", Duration::from_millis(10));
    let cancel = CancellationToken::new();
    cancel.cancel();

    worker
        .run(|_ctx: WorkerContext| async move { Handled::Ok(None) }, cancel)
        .await;

    assert_eq!(transport.pops.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pipeline_over_local_transport() {
    let dir = tempfile::tempdir().unwrap();
    let manager = QueueManager::new(dir.path(), 16);
    let transport = Arc::new(LocalTransport::new(manager.clone(), "shop"));

    let payload: Payload = [("amount", "10")].into_iter().collect();
    let item = Item::new("orders", "1001").with_payload(&payload).unwrap();
    manager.push("shop", &item.to_string()).await.unwrap();

    let worker = Worker::new(transport, "orders", Duration::from_millis(10));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            worker
                .run(
                    |mut ctx: WorkerContext| async move {
                        let amount = ctx.get_int("amount").unwrap_or_default();
                        ctx.set("amount", amount * 2);
                        Handled::Ok(Some(ctx.route_to("billing")?))
                    },
                    cancel,
                )
                .await
        }
    });

    timeout(Duration::from_secs(10), async {
        while manager.count("shop", "billing").await.unwrap_or(0) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("item never reached billing");
    cancel.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.chained, 1);
    let popped = manager.pop("shop", "billing", 1).await.unwrap();
    let next: Item = popped[0].parse().unwrap();
    assert_eq!(next.key(), "1001");
    assert_eq!(next.payload().unwrap().get("amount"), Some("20"));
    assert_eq!(manager.count("shop", "orders").await.unwrap(), 0);
}

#[tokio::test]
async fn test_local_transport_reports_pause() {
    let dir = tempfile::tempdir().unwrap();
    let manager = QueueManager::new(dir.path(), 16);
    let transport = LocalTransport::new(manager.clone(), "shop");

    assert_eq!(transport.pop("orders").await.unwrap(), PopOutcome::Empty);

    manager.push("shop", "orders.1").await.unwrap();
    manager.pause("shop", "orders").await.unwrap();
    assert_eq!(transport.pop("orders").await.unwrap(), PopOutcome::Paused);

    manager.resume("shop", "orders").await.unwrap();
    assert_eq!(
        transport.pop("orders").await.unwrap(),
        PopOutcome::Item("orders.1".to_string())
    );
}

#[test]
fn test_context_accessors() {
    let payload: Payload = [
        ("n", "42"),
        ("ratio", "0.5"),
        ("flag", "Yes"),
        ("off", "no"),
        ("at", "1700000000"),
    ]
    .into_iter()
    .collect();
    let item = Item::new("jobs", "7").with_payload(&payload).unwrap();
    let ctx = context(&item.to_string());

    assert_eq!(ctx.id(), "7");
    assert_eq!(ctx.channel(), "jobs");
    assert_eq!(ctx.get_int("n"), Some(42));
    assert_eq!(ctx.get_float("ratio"), Some(0.5));
    assert!(ctx.get_bool("flag"));
    assert!(!ctx.get_bool("off"));
    assert!(!ctx.get_bool("missing"));
    assert_eq!(ctx.get_int("ratio"), None);
    assert_eq!(ctx.get_time("at").map(|t| t.timestamp()), Some(1_700_000_000));
}

#[test]
fn test_context_mutation_and_routing() {
    let mut ctx = context("jobs.7");
    assert_eq!(ctx.route_to("next").unwrap(), "next.7");

    ctx.set_props([("a", "1"), ("b", "2")]);
    ctx.set("c", 3);
    assert!(ctx.has("c"));
    assert_eq!(ctx.remove("b").as_deref(), Some("2"));

    let routed: Item = ctx.route_to("next").unwrap().parse().unwrap();
    let data = routed.payload().unwrap();
    assert_eq!(data.get("a"), Some("1"));
    assert_eq!(data.get("c"), Some("3"));
    assert!(!data.contains("b"));

    ctx.clear();
    assert_eq!(ctx.route_to("next").unwrap(), "next.7");
}

#[test]
fn test_context_ignores_bad_payload() {
    let ctx = context("jobs.7.!!!notbase64");
    assert!(ctx.data().is_empty());
}
