//! Statistics, application listing, key/value and daemon endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::super::types::QueryParams;
use super::super::{AppError, SharedState, metrics};
use crate::constants::MSG_OK;
use crate::daemon::services::state::ChannelStats;
use crate::protocol::Envelope;

/// GET /tinyq/stats - Raw JSON array of per-channel statistics.
pub(crate) async fn stats(
    State(state): State<SharedState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<ChannelStats>>, AppError> {
    metrics::record_queue_operation("stats", "all");
    let stats = state.manager.stats(state.application(&params)).await?;
    Ok(Json(stats))
}

/// GET /tinyq/databases - Raw JSON array of application names.
pub(crate) async fn databases(
    State(state): State<SharedState>,
) -> Result<Json<Vec<String>>, AppError> {
    let applications = state.manager.applications().await?;
    Ok(Json(applications))
}

/// GET /tinyq/crud/{command}/{key} - `get`, `set?v=` or `delete`.
///
/// `get` answers an empty message for a missing key. `set` stores an empty
/// `v` as an empty value.
pub(crate) async fn crud(
    State(state): State<SharedState>,
    Path((command, key)): Path<(String, String)>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, AppError> {
    let application = state.application(&params);
    let message = match command.as_str() {
        "get" => state
            .manager
            .kv_get(application, &key)
            .await?
            .unwrap_or_default(),
        "set" => {
            let value = params
                .v
                .as_deref()
                .ok_or_else(|| AppError::Failed("missing parameter 'v'".to_string()))?;
            state.manager.kv_set(application, &key, value).await?;
            MSG_OK.to_string()
        },
        "delete" => {
            state.manager.kv_delete(application, &key).await?;
            MSG_OK.to_string()
        },
        other => return Err(AppError::BadRequest(format!("unknown crud command '{other}'"))),
    };
    Ok(Json(Envelope::ok(message)))
}

/// GET /health - Liveness and open applications.
pub(crate) async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let open = state.manager.registry().open_applications();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "open_applications": open,
    }))
}

/// GET /metrics - Prometheus exposition, 404 when disabled.
pub(crate) async fn metrics(State(state): State<SharedState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
