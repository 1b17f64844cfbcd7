//! HTTP daemon for tinyq.
//!
//! Exposes the queue manager under `/tinyq`. The application comes from the
//! `app` query parameter and falls back to the configured default; a `token`
//! parameter is accepted and ignored.
//!
//! Every queue endpoint answers 200 with an [`Envelope`]. Only a pop without
//! a channel (400), an invalid application name (400) and a store that
//! cannot be opened (500) use other status codes.

mod handlers;
pub mod metrics;
mod types;

use anyhow::Context;
use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::constants::{MSG_LOCKED, MSG_PAUSED};
use crate::daemon::manager::QueueManager;
use crate::error::Error;
use crate::protocol::Envelope;
use types::QueryParams;

/// State shared by all handlers.
pub struct AppState {
    pub manager: QueueManager,
    /// Application used when a request has no `app` parameter.
    pub default_app: String,
    /// Prometheus handle; `None` disables `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(manager: QueueManager, default_app: impl Into<String>) -> Self {
        Self {
            manager,
            default_app: default_app.into(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn application<'a>(&'a self, params: &'a QueryParams) -> &'a str {
        match params.app.as_deref() {
            Some(app) if !app.is_empty() => app,
            _ => &self.default_app,
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Handler error, rendered as an envelope.
#[derive(Debug)]
pub(crate) enum AppError {
    /// 400 with an error envelope.
    BadRequest(String),
    /// 500 with an error envelope.
    Internal(String),
    /// 200 with a control-flow message such as `paused` or `locked`.
    Rejected(&'static str),
    /// 200 with an error envelope.
    Failed(String),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelPaused { .. } => Self::Rejected(MSG_PAUSED),
            Error::ChannelLocked { .. } => Self::Rejected(MSG_LOCKED),
            Error::InvalidApplication { .. } => Self::BadRequest(err.to_string()),
            Error::ApplicationOpenFailure { .. } | Error::Join(_) => {
                Self::Internal(err.to_string())
            },
            _ => Self::Failed(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(Envelope::error(msg))).into_response()
            },
            Self::Internal(msg) => {
                warn!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(Envelope::error(msg))).into_response()
            },
            Self::Rejected(msg) => Json(Envelope::ok(msg)).into_response(),
            Self::Failed(msg) => {
                warn!(error = %msg, "Operation failed");
                Json(Envelope::error(msg)).into_response()
            },
        }
    }
}

/// Builds the daemon router.
pub fn router(state: SharedState) -> Router {
    let queue = Router::new()
        .route("/push", get(handlers::push))
        .route("/pop", get(handlers::pop))
        .route("/ack", get(handlers::ack))
        .route("/count", get(handlers::count))
        .route("/keys", get(handlers::keys))
        .route("/channels", get(handlers::channel_list))
        .route("/channels/pause", get(handlers::channel_pause))
        .route("/channels/resume", get(handlers::channel_resume))
        .route("/channels/status", get(handlers::channel_status))
        .route("/channels/lock", get(handlers::channel_lock))
        .route("/channels/unlock", get(handlers::channel_unlock))
        .route("/channels/lockstatus", get(handlers::channel_lock_status))
        .route("/channels/clear", get(handlers::channel_clear))
        .route("/channels/delete", get(handlers::channel_delete))
        .route("/stats", get(handlers::stats))
        .route("/databases", get(handlers::databases))
        .route("/crud/{command}/{key}", get(handlers::crud));

    Router::new()
        .nest("/tinyq", queue)
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

/// Runs the daemon until Ctrl+C, then drains the statistics aggregator.
///
/// # Errors
///
/// Returns an error if the root cannot be resolved, the address cannot be
/// bound, or the metrics recorder cannot be installed.
pub async fn serve(config: &ServerConfig) -> anyhow::Result<()> {
    let root = config.root_dir()?;
    let manager = QueueManager::new(root.clone(), config.stats_buffer);

    let mut state = AppState::new(manager.clone(), config.default_app.clone());
    if config.metrics {
        state = state.with_metrics(metrics::install_recorder()?);
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, root = %root.display(), default_app = %config.default_app, "tinyq listening");

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
