//! Consumer side: HTTP client, worker loop and per-item context.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tinyq::client::{ClientOptions, WebClient, Worker, WorkerContext};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let client = WebClient::new(ClientOptions::default())?;
//! let worker = Worker::new(Arc::new(client.clone()), "resize", client.backoff());
//!
//! let cancel = CancellationToken::new();
//! let summary = worker
//!     .run(
//!         |mut ctx: WorkerContext| async move {
//!             ctx.set("resized", true);
//!             // Hand the item on to the next stage
//!             anyhow::Ok(Some(ctx.route_to("upload")?))
//!         },
//!         cancel,
//!     )
//!     .await;
//! println!("processed {}", summary.processed);
//! # Ok(())
//! # }
//! ```

mod context;
mod transport;
mod web;
mod worker;

pub use context::WorkerContext;
pub use transport::{LocalTransport, PopOutcome, QueueTransport};
pub use web::{ClientOptions, WebClient};
pub use worker::{ItemHandler, Worker, WorkerState, WorkerSummary};

#[cfg(test)]
mod tests;
